use models::Id;
use sqlx::postgres::PgConnection;

#[derive(Debug, sqlx::FromRow)]
pub struct KnowledgeBaseRow {
    pub id: Id,
    pub name: String,
    pub category: String,
}

/// A knowledge base joined with its bound vector collection.
#[derive(Debug, sqlx::FromRow)]
pub struct KnowledgeBaseCollection {
    pub kb_id: Id,
    pub name: String,
    pub category: String,
    pub collection_id: Id,
    pub collection_name: String,
}

pub async fn insert(
    conn: &mut PgConnection,
    user_id: Id,
    name: &str,
    category: &str,
    collection_id: Id,
) -> sqlx::Result<Id> {
    sqlx::query_scalar::<_, Id>(
        r#"
        INSERT INTO knowledge_bases (user_id, name, category, collection_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(name)
    .bind(category)
    .bind(collection_id)
    .fetch_one(conn)
    .await
}

pub async fn fetch_with_collection(
    conn: &mut PgConnection,
    kb_id: Id,
    user_id: Id,
) -> sqlx::Result<Option<KnowledgeBaseCollection>> {
    sqlx::query_as::<_, KnowledgeBaseCollection>(
        r#"
        SELECT
            kb.id AS kb_id,
            kb.name,
            kb.category,
            c.id AS collection_id,
            c.collection_name
        FROM knowledge_bases kb
        JOIN vector_collections c ON c.id = kb.collection_id
        WHERE kb.id = $1 AND kb.user_id = $2
        "#,
    )
    .bind(kb_id)
    .bind(user_id)
    .fetch_optional(conn)
    .await
}

pub async fn list(
    pool: &sqlx::PgPool,
    user_id: Id,
    limit: i64,
    offset: i64,
) -> sqlx::Result<(Vec<KnowledgeBaseRow>, i64)> {
    let total = sqlx::query_scalar::<_, i64>(
        r#"SELECT COUNT(*) FROM knowledge_bases WHERE user_id = $1"#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, KnowledgeBaseRow>(
        r#"
        SELECT id, name, category
        FROM knowledge_bases
        WHERE user_id = $1
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

#[derive(Debug, sqlx::FromRow)]
pub struct KnowledgeBaseDocumentRow {
    pub id: Id,
    pub kb_doc_id: Id,
    pub file_name: String,
}

/// Successfully ingested documents of a knowledge base.
pub async fn list_documents(
    pool: &sqlx::PgPool,
    user_id: Id,
    kb_id: Id,
    limit: i64,
    offset: i64,
) -> sqlx::Result<(Vec<KnowledgeBaseDocumentRow>, i64)> {
    let total = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM documents_registry d
        JOIN knowledge_base_documents link ON d.id = link.document_id
        WHERE d.user_id = $1
          AND link.knowledge_base_id = $2
          AND link.op_status = 'SUCCESS'
        "#,
    )
    .bind(user_id)
    .bind(kb_id)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, KnowledgeBaseDocumentRow>(
        r#"
        SELECT d.id, link.id AS kb_doc_id, d.file_name
        FROM documents_registry d
        JOIN knowledge_base_documents link ON d.id = link.document_id
        WHERE d.user_id = $1
          AND link.knowledge_base_id = $2
          AND link.op_status = 'SUCCESS'
        ORDER BY d.id
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(user_id)
    .bind(kb_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok((rows, total))
}

/// Delete a knowledge base, returning the collection id it was bound to so
/// the caller can release the collection for cleanup.
pub async fn delete(
    conn: &mut PgConnection,
    user_id: Id,
    kb_id: Id,
) -> sqlx::Result<Option<Id>> {
    sqlx::query_scalar::<_, Id>(
        r#"
        DELETE FROM knowledge_bases
        WHERE id = $1 AND user_id = $2
        RETURNING collection_id
        "#,
    )
    .bind(kb_id)
    .bind(user_id)
    .fetch_optional(conn)
    .await
}
