use serde_json::json;

/// Request body creating a chunk collection: primary key, dense and
/// BM25-derived sparse vectors, scalar filter fields, and their indexes.
pub fn create_collection_request(collection_name: &str) -> serde_json::Value {
    json!({
        "collectionName": collection_name,
        "schema": {
            "autoId": false,
            "enableDynamicField": false,
            "fields": [
                {
                    "fieldName": "id",
                    "dataType": "VarChar",
                    "isPrimary": true,
                    "elementTypeParams": { "max_length": 36 }
                },
                {
                    "fieldName": "text_dense_vector",
                    "dataType": "FloatVector",
                    "elementTypeParams": { "dim": models::EMBEDDING_DIMENSION }
                },
                {
                    "fieldName": "text_sparse_vector",
                    "dataType": "SparseFloatVector"
                },
                {
                    "fieldName": "category",
                    "dataType": "VarChar",
                    "elementTypeParams": { "max_length": 100 }
                },
                {
                    "fieldName": "object_key",
                    "dataType": "VarChar",
                    "elementTypeParams": { "max_length": 2048 }
                },
                {
                    "fieldName": "file_name",
                    "dataType": "VarChar",
                    "elementTypeParams": { "max_length": 255 }
                },
                {
                    "fieldName": "text_content",
                    "dataType": "VarChar",
                    "elementTypeParams": { "max_length": 65535 }
                },
                { "fieldName": "user_id", "dataType": "Int64" },
                { "fieldName": "file_id", "dataType": "Int64" },
                { "fieldName": "parent_id", "dataType": "Int64" }
            ],
            "functions": [
                {
                    "name": "text_bm25_emb",
                    "type": "BM25",
                    "inputFieldNames": ["text_content"],
                    "outputFieldNames": ["text_sparse_vector"]
                }
            ]
        },
        "indexParams": [
            {
                "fieldName": "text_dense_vector",
                "indexName": "text_dense_index",
                "indexType": "HNSW",
                "metricType": "COSINE",
                "params": { "M": 32, "efConstruction": 400 }
            },
            {
                "fieldName": "text_sparse_vector",
                "indexName": "text_sparse_index",
                "indexType": "SPARSE_INVERTED_INDEX",
                "metricType": "BM25",
                "params": {
                    "inverted_index_algo": "DAAT_MAXSCORE",
                    "bm25_k1": 1.2,
                    "bm25_b": 0.75
                }
            },
            {
                "fieldName": "user_id",
                "indexName": "user_index",
                "indexType": "INVERTED"
            },
            {
                "fieldName": "file_id",
                "indexName": "file_index",
                "indexType": "INVERTED"
            },
            {
                "fieldName": "category",
                "indexName": "category_index",
                "indexType": "BITMAP"
            }
        ]
    })
}

#[cfg(test)]
mod test {
    use super::create_collection_request;

    #[test]
    fn collection_schema_shape() {
        let request = create_collection_request("_testcollection01");

        assert_eq!(request["collectionName"], "_testcollection01");

        let fields = request["schema"]["fields"].as_array().unwrap();
        let names: Vec<&str> = fields
            .iter()
            .map(|f| f["fieldName"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "id",
                "text_dense_vector",
                "text_sparse_vector",
                "category",
                "object_key",
                "file_name",
                "text_content",
                "user_id",
                "file_id",
                "parent_id",
            ],
        );

        let functions = request["schema"]["functions"].as_array().unwrap();
        assert_eq!(functions[0]["type"], "BM25");

        let indexes = request["indexParams"].as_array().unwrap();
        assert_eq!(indexes.len(), 5);
        assert_eq!(indexes[0]["indexType"], "HNSW");
        assert_eq!(indexes[0]["metricType"], "COSINE");
        assert_eq!(indexes[1]["params"]["bm25_k1"], 1.2);
        assert_eq!(indexes[4]["indexType"], "BITMAP");
    }

    #[test]
    fn dense_vector_dimension_matches_model() {
        let request = create_collection_request("_c");
        let dim = &request["schema"]["fields"][1]["elementTypeParams"]["dim"];
        assert_eq!(dim.as_u64().unwrap() as usize, models::EMBEDDING_DIMENSION);
    }
}
