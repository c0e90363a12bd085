mod chunk_id;
mod content_type;
mod envelope;
mod status;

pub use chunk_id::chunk_vector_id;
pub use content_type::{content_type_for, extension_of, is_allowed_extension, ALLOWED_EXTENSIONS};
pub use envelope::{IngestionFile, JobMessage, ReceivedMessage};
pub use status::{ClientRole, CollectionStatus, OperationStatus};

/// Row identifiers are 64-bit identity columns in the ledger.
pub type Id = i64;

/// Output dimension of the embedding model, fixed by the vector collection
/// schema. Changing it requires re-provisioning every collection.
pub const EMBEDDING_DIMENSION: usize = 1536;
