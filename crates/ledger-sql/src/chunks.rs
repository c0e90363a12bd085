use models::Id;
use sqlx::postgres::PgConnection;

pub async fn insert_parent_chunk(
    conn: &mut PgConnection,
    document_id: Id,
    chunk_text: &str,
) -> sqlx::Result<Id> {
    sqlx::query_scalar::<_, Id>(
        r#"
        INSERT INTO parent_chunks (document_id, chunk_text)
        VALUES ($1, $2)
        RETURNING id
        "#,
    )
    .bind(document_id)
    .bind(chunk_text)
    .fetch_one(conn)
    .await
}

pub async fn delete_parent_chunks(
    conn: &mut PgConnection,
    document_id: Id,
) -> sqlx::Result<u64> {
    let result = sqlx::query(r#"DELETE FROM parent_chunks WHERE document_id = $1"#)
        .bind(document_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}
