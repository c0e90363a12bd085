use chrono::{DateTime, Utc};
use models::Id;
use sqlx::postgres::PgConnection;

#[derive(Debug, sqlx::FromRow)]
pub struct EncryptionKeyRow {
    pub id: Id,
    pub symmetric_key: Vec<u8>,
    pub is_active: bool,
    pub expired_at: Option<DateTime<Utc>>,
}

pub async fn fetch_active(conn: &mut PgConnection) -> sqlx::Result<Option<EncryptionKeyRow>> {
    sqlx::query_as::<_, EncryptionKeyRow>(
        r#"
        SELECT id, symmetric_key, is_active, expired_at
        FROM encryption_keys
        WHERE is_active
        "#,
    )
    .fetch_optional(conn)
    .await
}

/// Inactive keys still inside their verification window. Expired keys are
/// never loaded; signatures under them no longer verify.
pub async fn fetch_verifiable(conn: &mut PgConnection) -> sqlx::Result<Vec<EncryptionKeyRow>> {
    sqlx::query_as::<_, EncryptionKeyRow>(
        r#"
        SELECT id, symmetric_key, is_active, expired_at
        FROM encryption_keys
        WHERE NOT is_active
          AND (expired_at IS NULL OR expired_at > NOW())
        "#,
    )
    .fetch_all(conn)
    .await
}

pub async fn insert_active(conn: &mut PgConnection, symmetric_key: &[u8]) -> sqlx::Result<Id> {
    sqlx::query_scalar::<_, Id>(
        r#"
        INSERT INTO encryption_keys (symmetric_key, is_active)
        VALUES ($1, TRUE)
        RETURNING id
        "#,
    )
    .bind(symmetric_key)
    .fetch_one(conn)
    .await
}

/// Rotate the signing key: retire the current active key with a verification
/// grace window, and install the new material as the single active key.
/// Callers run this inside one transaction.
pub async fn rotate(
    conn: &mut PgConnection,
    new_key: &[u8],
    grace_minutes: i64,
) -> sqlx::Result<Id> {
    sqlx::query(
        r#"
        UPDATE encryption_keys
        SET is_active = FALSE,
            expired_at = NOW() + make_interval(mins => $1::INT),
            updated_at = NOW()
        WHERE is_active
        "#,
    )
    .bind(grace_minutes)
    .execute(&mut *conn)
    .await?;

    insert_active(conn, new_key).await
}
