pub mod api_keys;
pub mod chunks;
pub mod collections;
pub mod documents;
pub mod encryption_keys;
pub mod ingestion;
pub mod knowledge_bases;
pub mod users;

pub use models::Id;

/// True when `err` is a Postgres unique violation on the named constraint.
pub fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => db.constraint() == Some(constraint),
        _ => false,
    }
}
