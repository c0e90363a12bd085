use models::{ClientRole, Id};
use sqlx::postgres::PgConnection;

#[derive(Debug, sqlx::FromRow)]
pub struct VerifiedApiKey {
    pub id: Id,
    pub user_id: Id,
    pub user_email: String,
    pub user_role: ClientRole,
    pub key_id: Id,
    pub key_credential: Vec<u8>,
    pub key_signature: Vec<u8>,
}

pub async fn insert(
    conn: &mut PgConnection,
    user_id: Id,
    key_id: Id,
    key_credential: &[u8],
    key_signature: &[u8],
) -> sqlx::Result<Id> {
    sqlx::query_scalar::<_, Id>(
        r#"
        INSERT INTO api_keys (user_id, key_id, key_credential, key_signature)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(key_id)
    .bind(key_credential)
    .bind(key_signature)
    .fetch_one(conn)
    .await
}

pub async fn fetch_by_credential(
    conn: &mut PgConnection,
    key_credential: &[u8],
) -> sqlx::Result<Option<VerifiedApiKey>> {
    sqlx::query_as::<_, VerifiedApiKey>(
        r#"
        SELECT
            k.id,
            k.user_id,
            u.email AS user_email,
            u.role AS user_role,
            k.key_id,
            k.key_credential,
            k.key_signature
        FROM api_keys k
        JOIN user_clients u ON u.id = k.user_id
        WHERE k.key_credential = $1
        "#,
    )
    .bind(key_credential)
    .fetch_optional(conn)
    .await
}

pub async fn delete(conn: &mut PgConnection, user_id: Id, key_id: Id) -> sqlx::Result<u64> {
    let result = sqlx::query(r#"DELETE FROM api_keys WHERE id = $1 AND user_id = $2"#)
        .bind(key_id)
        .bind(user_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}
