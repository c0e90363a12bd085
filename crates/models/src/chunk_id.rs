use uuid::Uuid;

/// Deterministic vector-entity id: UUIDv5 over the DNS namespace of
/// `"{file_name}::parent:{parent_id}::chunk:{chunk_index}"`.
///
/// Redelivered ingestion messages regenerate identical ids, so vector-store
/// upserts converge instead of duplicating entities.
pub fn chunk_vector_id(file_name: &str, parent_id: i64, chunk_index: usize) -> String {
    let name = format!("{file_name}::parent:{parent_id}::chunk:{chunk_index}");
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes()).to_string()
}

#[cfg(test)]
mod test {
    use super::chunk_vector_id;

    #[test]
    fn ids_are_stable() {
        let a = chunk_vector_id("report.pdf", 17, 0);
        let b = chunk_vector_id("report.pdf", 17, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn ids_distinguish_every_component() {
        let base = chunk_vector_id("report.pdf", 17, 0);
        assert_ne!(base, chunk_vector_id("report2.pdf", 17, 0));
        assert_ne!(base, chunk_vector_id("report.pdf", 18, 0));
        assert_ne!(base, chunk_vector_id("report.pdf", 17, 1));
    }

    #[test]
    fn id_is_a_uuid() {
        let id = chunk_vector_id("a.txt", 1, 2);
        assert_eq!(id.len(), 36);
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }
}
