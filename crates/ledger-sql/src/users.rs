use models::{ClientRole, Id};
use sqlx::postgres::PgConnection;

#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub id: Id,
    pub email: String,
    pub role: ClientRole,
}

pub async fn insert(
    conn: &mut PgConnection,
    email: &str,
    role: ClientRole,
) -> sqlx::Result<Id> {
    sqlx::query_scalar::<_, Id>(
        r#"
        INSERT INTO user_clients (email, role)
        VALUES ($1, $2)
        RETURNING id
        "#,
    )
    .bind(email)
    .bind(role)
    .fetch_one(conn)
    .await
}

pub async fn fetch_by_email(
    conn: &mut PgConnection,
    email: &str,
) -> sqlx::Result<Option<UserRow>> {
    sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, email, role
        FROM user_clients
        WHERE email = $1
        "#,
    )
    .bind(email)
    .fetch_optional(conn)
    .await
}
