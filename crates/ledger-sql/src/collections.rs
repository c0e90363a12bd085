use models::{CollectionStatus, Id};
use sqlx::postgres::PgConnection;

#[derive(Debug, sqlx::FromRow)]
pub struct CollectionRow {
    pub id: Id,
    pub collection_name: String,
    pub status: CollectionStatus,
}

/// Counts backing the reconcile decision: ready collections plus those
/// still provisioning within the freshness threshold.
#[derive(Debug, Default, sqlx::FromRow)]
pub struct PoolCounts {
    pub available: i64,
    pub provisioning: i64,
}

pub async fn insert_provisioning(
    conn: &mut PgConnection,
    collection_name: &str,
) -> sqlx::Result<Id> {
    sqlx::query_scalar::<_, Id>(
        r#"
        INSERT INTO vector_collections (collection_name, status)
        VALUES ($1, 'PROVISIONING')
        RETURNING id
        "#,
    )
    .bind(collection_name)
    .fetch_one(conn)
    .await
}

pub async fn mark_available(conn: &mut PgConnection, id: Id) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE vector_collections
        SET status = 'AVAILABLE', updated_at = NOW()
        WHERE id = $1 AND status = 'PROVISIONING'
        "#,
    )
    .bind(id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn mark_failed(conn: &mut PgConnection, id: Id) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE vector_collections
        SET status = 'FAILED', updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn delete_row(conn: &mut PgConnection, id: Id) -> sqlx::Result<u64> {
    let result = sqlx::query(r#"DELETE FROM vector_collections WHERE id = $1"#)
        .bind(id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

pub async fn pool_counts(
    pool: &sqlx::PgPool,
    provisioning_threshold_minutes: i64,
) -> sqlx::Result<PoolCounts> {
    sqlx::query_as::<_, PoolCounts>(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE status = 'AVAILABLE') AS available,
            COUNT(*) FILTER (
                WHERE status = 'PROVISIONING'
                  AND created_at >= NOW() - make_interval(mins => $1::INT)
            ) AS provisioning
        FROM vector_collections
        "#,
    )
    .bind(provisioning_threshold_minutes)
    .fetch_one(pool)
    .await
}

/// Collections eligible for physical drop: failed creates, provisioning rows
/// stuck past the stale threshold, and CLEANUP rows no knowledge base
/// references any longer.
pub async fn cleanup_candidates(
    pool: &sqlx::PgPool,
    stuck_after_minutes: i64,
) -> sqlx::Result<Vec<CollectionRow>> {
    sqlx::query_as::<_, CollectionRow>(
        r#"
        SELECT c.id, c.collection_name, c.status
        FROM vector_collections c
        LEFT OUTER JOIN knowledge_bases kb ON kb.collection_id = c.id
        WHERE c.status = 'FAILED'
           OR (c.status = 'PROVISIONING'
               AND c.created_at < NOW() - make_interval(mins => $1::INT))
           OR (c.status = 'CLEANUP' AND kb.id IS NULL)
        "#,
    )
    .bind(stuck_after_minutes)
    .fetch_all(pool)
    .await
}

/// Claim one AVAILABLE collection for a new knowledge base. Row-level locking
/// with SKIP LOCKED keeps concurrent bindings from claiming the same row;
/// None means the warm pool is exhausted.
pub async fn bind_available(conn: &mut PgConnection) -> sqlx::Result<Option<CollectionRow>> {
    sqlx::query_as::<_, CollectionRow>(
        r#"
        UPDATE vector_collections
        SET status = 'ASSIGNED', updated_at = NOW()
        WHERE id = (
            SELECT id
            FROM vector_collections
            WHERE status = 'AVAILABLE'
            ORDER BY random()
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, collection_name, status
        "#,
    )
    .fetch_optional(conn)
    .await
}

/// Hand an ASSIGNED collection over to the cleanup worker after its
/// knowledge base is deleted.
pub async fn release_for_cleanup(conn: &mut PgConnection, id: Id) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE vector_collections
        SET status = 'CLEANUP', updated_at = NOW()
        WHERE id = $1 AND status = 'ASSIGNED'
        "#,
    )
    .bind(id)
    .execute(conn)
    .await?;

    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
pub struct PoolStatRow {
    pub status: CollectionStatus,
    pub count: i64,
}

pub async fn pool_stats(pool: &sqlx::PgPool) -> sqlx::Result<Vec<PoolStatRow>> {
    sqlx::query_as::<_, PoolStatRow>(
        r#"
        SELECT status, COUNT(*) AS count
        FROM vector_collections
        GROUP BY status
        ORDER BY status
        "#,
    )
    .fetch_all(pool)
    .await
}
