use anyhow::Context;
use object_store::ObjectStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Reaper reconciles ledger state that drifted from the object store, and
/// ages out ingestion jobs that never completed. It runs on a fixed
/// schedule plus an optional trigger.
pub struct Reaper<S> {
    pool: sqlx::PgPool,
    object_store: Arc<S>,
    interval: std::time::Duration,
    stuck_job_ttl_minutes: i64,
}

impl<S: ObjectStore> Reaper<S> {
    pub fn new(
        pool: sqlx::PgPool,
        object_store: Arc<S>,
        interval: std::time::Duration,
        stuck_job_ttl_minutes: i64,
    ) -> Self {
        Self {
            pool,
            object_store,
            interval,
            stuck_job_ttl_minutes,
        }
    }

    pub async fn run(
        self,
        mut trigger: tokio::sync::mpsc::Receiver<()>,
        cancel: CancellationToken,
    ) {
        tracing::info!("reaper started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {
                    tracing::info!("starting scheduled reaper pass");
                }
                received = trigger.recv() => {
                    if received.is_none() {
                        break;
                    }
                    while trigger.try_recv().is_ok() {}
                }
            }

            if let Err(err) = self.run_once().await {
                tracing::error!(?err, "reaper pass failed");
            }
        }

        tracing::info!("reaper stopped");
    }

    pub async fn run_once(&self) -> anyhow::Result<()> {
        self.reconcile_conflicted_documents().await?;
        self.fail_stuck_jobs().await?;
        Ok(())
    }

    /// Probe the object store for every document stuck outside the stable
    /// (unlocked, SUCCESS) state: rows whose object vanished are deleted,
    /// rows whose object exists are settled into the stable state.
    async fn reconcile_conflicted_documents(&self) -> anyhow::Result<()> {
        let conflicted = ledger_sql::documents::conflicted_documents(&self.pool)
            .await
            .context("querying conflicted documents")?;

        if conflicted.is_empty() {
            return Ok(());
        }
        tracing::info!(count = conflicted.len(), "reconciling conflicted documents");

        let mut to_be_unlocked = Vec::new();
        let mut to_be_deleted = Vec::new();

        for doc in &conflicted {
            let exists = self
                .object_store
                .object_exists(&doc.object_key)
                .await
                .with_context(|| format!("probing object {:?}", doc.object_key))?;

            if exists {
                to_be_unlocked.push(doc.id);
            } else {
                to_be_deleted.push(doc.id);
            }
        }

        let mut txn = self.pool.begin().await?;
        ledger_sql::documents::cleanup_documents(&mut txn, &to_be_unlocked, &to_be_deleted)
            .await
            .context("cleaning up conflicted documents")?;
        txn.commit().await?;

        tracing::info!(
            unlocked = to_be_unlocked.len(),
            deleted = to_be_deleted.len(),
            "reconciled conflicted documents"
        );
        Ok(())
    }

    async fn fail_stuck_jobs(&self) -> anyhow::Result<()> {
        let failed = ledger_sql::ingestion::fail_stuck_jobs(&self.pool, self.stuck_job_ttl_minutes)
            .await
            .context("failing stuck ingestion jobs")?;

        if failed > 0 {
            tracing::warn!(failed, "failed stuck ingestion jobs");
        }
        Ok(())
    }
}
