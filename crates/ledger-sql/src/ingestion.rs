use models::{Id, OperationStatus};
use sqlx::postgres::PgConnection;
use uuid::Uuid;

pub async fn insert_job(
    conn: &mut PgConnection,
    kb_id: Id,
    resource_id: Uuid,
) -> sqlx::Result<Id> {
    sqlx::query_scalar::<_, Id>(
        r#"
        INSERT INTO ingestion_jobs (kb_id, resource_id, op_status)
        VALUES ($1, $2, 'PENDING')
        RETURNING id
        "#,
    )
    .bind(kb_id)
    .bind(resource_id)
    .fetch_one(conn)
    .await
}

#[derive(Debug, sqlx::FromRow)]
pub struct AdmissibleDocument {
    pub id: Id,
    pub file_name: String,
    pub object_key: String,
}

/// Documents in `document_ids` that belong to `user_id` and sit in the
/// stable unlocked SUCCESS state. Anything missing from the result was not
/// admissible and fails the request.
pub async fn admissible_documents(
    conn: &mut PgConnection,
    user_id: Id,
    document_ids: &[Id],
) -> sqlx::Result<Vec<AdmissibleDocument>> {
    sqlx::query_as::<_, AdmissibleDocument>(
        r#"
        SELECT id, file_name, object_key
        FROM documents_registry
        WHERE id = ANY($1)
          AND user_id = $2
          AND lock_status = FALSE
          AND op_status = 'SUCCESS'
        "#,
    )
    .bind(document_ids)
    .bind(user_id)
    .fetch_all(conn)
    .await
}

#[derive(Debug, sqlx::FromRow)]
pub struct UpsertedLink {
    pub id: Id,
    pub document_id: Id,
}

/// Upsert knowledge-base links to PENDING for an admitted batch. A conflict
/// on the unique (kb, document) pair resets the existing link to PENDING so
/// redelivery and re-ingestion converge on the same row.
pub async fn upsert_links(
    conn: &mut PgConnection,
    kb_id: Id,
    document_ids: &[Id],
) -> sqlx::Result<Vec<UpsertedLink>> {
    sqlx::query_as::<_, UpsertedLink>(
        r#"
        INSERT INTO knowledge_base_documents (knowledge_base_id, document_id, op_status)
        SELECT $1, d, 'PENDING'::operation_status
        FROM UNNEST($2::INT8[]) AS t(d)
        ON CONFLICT (knowledge_base_id, document_id)
        DO UPDATE SET op_status = 'PENDING', updated_at = NOW()
        RETURNING id, document_id
        "#,
    )
    .bind(kb_id)
    .bind(document_ids)
    .fetch_all(conn)
    .await
}

/// Record per-file indexing outcomes on the link rows.
pub async fn set_link_statuses(
    conn: &mut PgConnection,
    successful: &[Id],
    failed: &[Id],
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE knowledge_base_documents
        SET op_status = CASE
                WHEN id = ANY($1) THEN 'SUCCESS'::operation_status
                ELSE 'FAILED'::operation_status
            END,
            updated_at = NOW()
        WHERE id = ANY($1) OR id = ANY($2)
        "#,
    )
    .bind(successful)
    .bind(failed)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Remove links whose vector-store deletion succeeded.
pub async fn delete_links(conn: &mut PgConnection, kb_doc_ids: &[Id]) -> sqlx::Result<u64> {
    let result = sqlx::query(r#"DELETE FROM knowledge_base_documents WHERE id = ANY($1)"#)
        .bind(kb_doc_ids)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

pub async fn fail_links(conn: &mut PgConnection, kb_doc_ids: &[Id]) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE knowledge_base_documents
        SET op_status = 'FAILED', updated_at = NOW()
        WHERE id = ANY($1)
        "#,
    )
    .bind(kb_doc_ids)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn set_job_status(
    conn: &mut PgConnection,
    job_id: Id,
    status: OperationStatus,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE ingestion_jobs
        SET op_status = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(status)
    .execute(conn)
    .await?;

    Ok(())
}

/// Age out jobs that never completed: PENDING rows untouched for longer
/// than the TTL are failed so their links stop implying an open job.
pub async fn fail_stuck_jobs(pool: &sqlx::PgPool, ttl_minutes: i64) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE ingestion_jobs
        SET op_status = 'FAILED', updated_at = NOW()
        WHERE op_status = 'PENDING'
          AND updated_at < NOW() - make_interval(mins => $1::INT)
        "#,
    )
    .bind(ttl_minutes)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
