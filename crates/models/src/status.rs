use serde::{Deserialize, Serialize};

/// OperationStatus tracks the lifecycle of documents, knowledge-base links,
/// and ingestion jobs through the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "operation_status")]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationStatus {
    Pending,
    Success,
    Failed,
}

/// CollectionStatus is the provisioner-owned state of a vector collection.
///
/// ```text
/// PROVISIONING -> AVAILABLE -> ASSIGNED -> CLEANUP -> (dropped)
///      |
///      +-> FAILED -> CLEANUP
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "collection_status")]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum CollectionStatus {
    Provisioning,
    Available,
    Assigned,
    Cleanup,
    Failed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "client_role")]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ClientRole {
    User,
    Admin,
}
