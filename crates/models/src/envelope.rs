use serde::{Deserialize, Serialize};

/// One file of an ingestion manifest, as carried by a queue message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionFile {
    pub kb_doc_id: i64,
    pub doc_id: i64,
    pub file_name: String,
    pub object_key: String,
}

/// JobMessage is the queue envelope published at admission and consumed by
/// the ingestion worker. Exactly one of `index_kb_doc_id` / `delete_kb_doc_id`
/// is non-null in normal operation. Unknown fields are ignored on receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    pub ingestion_job_id: i64,
    pub kb_id: i64,
    pub collection_name: String,
    pub category: String,
    pub user_id: i64,
    pub index_kb_doc_id: Option<Vec<IngestionFile>>,
    pub delete_kb_doc_id: Option<Vec<IngestionFile>>,
}

impl JobMessage {
    /// A message is well-formed when it carries exactly one non-empty list.
    pub fn is_well_formed(&self) -> bool {
        let index = self.index_kb_doc_id.as_ref().map_or(0, Vec::len);
        let delete = self.delete_kb_doc_id.as_ref().map_or(0, Vec::len);
        (index == 0) != (delete == 0)
    }
}

/// A JobMessage as dequeued from the broker, paired with the receipt handle
/// required to acknowledge it.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: JobMessage,
}

#[cfg(test)]
mod test {
    use super::*;

    fn fixture() -> JobMessage {
        JobMessage {
            ingestion_job_id: 7,
            kb_id: 5,
            collection_name: "_a1b2c3d4e5f60708".to_string(),
            category: "default".to_string(),
            user_id: 42,
            index_kb_doc_id: Some(vec![IngestionFile {
                kb_doc_id: 11,
                doc_id: 10,
                file_name: "report.pdf".to_string(),
                object_key: "42/report.pdf".to_string(),
            }]),
            delete_kb_doc_id: None,
        }
    }

    #[test]
    fn envelope_field_names_are_fixed() {
        insta::assert_json_snapshot!(fixture(), @r###"
        {
          "ingestion_job_id": 7,
          "kb_id": 5,
          "collection_name": "_a1b2c3d4e5f60708",
          "category": "default",
          "user_id": 42,
          "index_kb_doc_id": [
            {
              "kb_doc_id": 11,
              "doc_id": 10,
              "file_name": "report.pdf",
              "object_key": "42/report.pdf"
            }
          ],
          "delete_kb_doc_id": null
        }
        "###);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let raw = r#"{
            "ingestion_job_id": 1,
            "kb_id": 2,
            "collection_name": "_c",
            "category": "general",
            "user_id": 3,
            "index_kb_doc_id": null,
            "delete_kb_doc_id": [],
            "job_resource_id": "9f0c1c0a-0000-0000-0000-000000000000"
        }"#;
        let msg: JobMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.kb_id, 2);
        assert!(msg.index_kb_doc_id.is_none());
    }

    #[test]
    fn well_formed_requires_exactly_one_list() {
        let mut msg = fixture();
        assert!(msg.is_well_formed());

        msg.delete_kb_doc_id = msg.index_kb_doc_id.clone();
        assert!(!msg.is_well_formed());

        msg.index_kb_doc_id = None;
        assert!(msg.is_well_formed());

        msg.delete_kb_doc_id = None;
        assert!(!msg.is_well_formed());
    }
}
