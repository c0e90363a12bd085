use models::{Id, OperationStatus};
use sqlx::postgres::PgConnection;

#[derive(Debug, Clone)]
pub struct CreateDocument {
    pub user_id: Id,
    pub file_name: String,
    pub object_key: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct DocumentRow {
    pub id: Id,
    pub file_name: String,
    pub object_key: String,
    pub lock_status: bool,
    pub op_status: OperationStatus,
}

#[derive(Debug, sqlx::FromRow)]
pub struct CreatedDocument {
    pub id: Id,
    pub file_name: String,
}

/// Register uploaded documents. Rows start locked and PENDING until the
/// client's finalize callback reports the upload outcome.
pub async fn create_documents(
    conn: &mut PgConnection,
    files: &[CreateDocument],
) -> sqlx::Result<Vec<CreatedDocument>> {
    let user_ids: Vec<Id> = files.iter().map(|f| f.user_id).collect();
    let file_names: Vec<String> = files.iter().map(|f| f.file_name.clone()).collect();
    let object_keys: Vec<String> = files.iter().map(|f| f.object_key.clone()).collect();

    sqlx::query_as::<_, CreatedDocument>(
        r#"
        INSERT INTO documents_registry (user_id, file_name, object_key, lock_status, op_status)
        SELECT u, f, o, TRUE, 'PENDING'::operation_status
        FROM UNNEST($1::INT8[], $2::TEXT[], $3::TEXT[]) AS t(u, f, o)
        RETURNING id, file_name
        "#,
    )
    .bind(user_ids)
    .bind(file_names)
    .bind(object_keys)
    .fetch_all(conn)
    .await
}

/// Apply the client's upload outcome: unlock every named document and mark
/// it SUCCESS or FAILED in a single statement.
pub async fn finalize_documents(
    conn: &mut PgConnection,
    user_id: Id,
    successful: &[Id],
    failed: &[Id],
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE documents_registry
        SET op_status = CASE
                WHEN id = ANY($2) THEN 'SUCCESS'::operation_status
                ELSE 'FAILED'::operation_status
            END,
            lock_status = FALSE,
            updated_at = NOW()
        WHERE user_id = $1 AND (id = ANY($2) OR id = ANY($3))
        "#,
    )
    .bind(user_id)
    .bind(successful)
    .bind(failed)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn list_documents(
    pool: &sqlx::PgPool,
    user_id: Id,
    limit: i64,
    offset: i64,
) -> sqlx::Result<(Vec<DocumentRow>, i64)> {
    let total = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM documents_registry
        WHERE user_id = $1 AND lock_status = FALSE AND op_status = 'SUCCESS'
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, DocumentRow>(
        r#"
        SELECT id, file_name, object_key, lock_status, op_status
        FROM documents_registry
        WHERE user_id = $1 AND lock_status = FALSE AND op_status = 'SUCCESS'
        ORDER BY id
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok((rows, total))
}

/// Document ids among `document_ids` that are linked into any knowledge base.
/// Linked documents cannot be locked for deletion.
pub async fn linked_documents(
    conn: &mut PgConnection,
    document_ids: &[Id],
) -> sqlx::Result<Vec<Id>> {
    sqlx::query_scalar::<_, Id>(
        r#"
        SELECT DISTINCT document_id
        FROM knowledge_base_documents
        WHERE document_id = ANY($1)
        "#,
    )
    .bind(document_ids)
    .fetch_all(conn)
    .await
}

/// Phase one of document deletion: flip stable rows back to a locked PENDING
/// state, returning the object keys to remove from the object store.
pub async fn lock_documents(
    conn: &mut PgConnection,
    document_ids: &[Id],
    user_id: Id,
) -> sqlx::Result<Vec<String>> {
    sqlx::query_scalar::<_, String>(
        r#"
        UPDATE documents_registry
        SET lock_status = TRUE,
            op_status = 'PENDING',
            updated_at = NOW()
        WHERE id = ANY($1)
          AND user_id = $2
          AND lock_status = FALSE
          AND op_status = 'SUCCESS'
        RETURNING object_key
        "#,
    )
    .bind(document_ids)
    .bind(user_id)
    .fetch_all(conn)
    .await
}

/// Phase two of document deletion, after the object-store delete succeeded.
pub async fn remove_documents(
    conn: &mut PgConnection,
    document_ids: &[Id],
    user_id: Id,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM documents_registry
        WHERE id = ANY($1)
          AND user_id = $2
          AND lock_status = TRUE
          AND op_status = 'PENDING'
        "#,
    )
    .bind(document_ids)
    .bind(user_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

#[derive(Debug, sqlx::FromRow)]
pub struct ConflictedDocument {
    pub id: Id,
    pub user_id: Id,
    pub object_key: String,
}

/// Documents whose (lock_status, op_status) is not the stable
/// (unlocked, SUCCESS) combination. The reaper reconciles these against
/// the object store.
pub async fn conflicted_documents(pool: &sqlx::PgPool) -> sqlx::Result<Vec<ConflictedDocument>> {
    sqlx::query_as::<_, ConflictedDocument>(
        r#"
        SELECT id, user_id, object_key
        FROM documents_registry
        WHERE NOT (lock_status = FALSE AND op_status = 'SUCCESS')
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Resolve conflicted documents: delete rows whose object is gone, and
/// settle rows whose object exists into the stable unlocked SUCCESS state.
pub async fn cleanup_documents(
    conn: &mut PgConnection,
    to_be_unlocked: &[Id],
    to_be_deleted: &[Id],
) -> sqlx::Result<()> {
    if !to_be_deleted.is_empty() {
        sqlx::query(r#"DELETE FROM documents_registry WHERE id = ANY($1)"#)
            .bind(to_be_deleted)
            .execute(&mut *conn)
            .await?;
    }

    if !to_be_unlocked.is_empty() {
        sqlx::query(
            r#"
            UPDATE documents_registry
            SET lock_status = FALSE,
                op_status = 'SUCCESS',
                updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(to_be_unlocked)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
