use serde::Serialize;

/// One child-chunk entity of a vector collection.
///
/// The sparse vector field is intentionally absent: the collection schema
/// installs a BM25 function that derives `text_sparse_vector` from
/// `text_content` server-side.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkEntity {
    pub id: String,
    pub text_dense_vector: Vec<f32>,
    pub text_content: String,
    pub object_key: String,
    pub category: String,
    pub file_name: String,
    pub user_id: i64,
    pub file_id: i64,
    pub parent_id: i64,
}

#[cfg(test)]
mod test {
    use super::ChunkEntity;

    #[test]
    fn sparse_vector_is_never_serialized() {
        let entity = ChunkEntity {
            id: "00000000-0000-0000-0000-000000000000".to_string(),
            text_dense_vector: vec![0.25, 0.5],
            text_content: "some text".to_string(),
            object_key: "42/a.txt".to_string(),
            category: "default".to_string(),
            file_name: "a.txt".to_string(),
            user_id: 42,
            file_id: 7,
            parent_id: 3,
        };

        let value = serde_json::to_value(&entity).unwrap();
        assert!(value.get("text_sparse_vector").is_none());
        assert_eq!(value["file_id"], 7);
    }
}
