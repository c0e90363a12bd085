use anyhow::Context;
use futures::StreamExt;
use rand::distributions::{Alphanumeric, DistString};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vector_store::VectorStore;

/// Fallback cadence of the reconcile worker when no trigger arrives.
const RECONCILE_FALLBACK: std::time::Duration = std::time::Duration::from_secs(300);

/// Age after which a PROVISIONING row is considered stuck and reclaimed.
const STUCK_PROVISIONING_MINUTES: i64 = 10;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Reconcile tops the pool up to this many ready collections.
    pub min_pool_size: usize,
    /// Hard ceiling on pool size; reconcile never provisions past it.
    pub max_pool_size: usize,
    /// PROVISIONING rows younger than this still count toward the pool.
    pub provisioning_threshold_minutes: i64,
    /// Concurrency cap for provisioning and cleanup tasks within a pass.
    pub max_concurrent: usize,
}

/// Non-blocking, coalescing wake-up signals for the two pool workers.
/// The channels hold one slot; a signal onto a full channel is dropped
/// because a pass is already pending.
#[derive(Clone)]
pub struct Triggers {
    reconcile: tokio::sync::mpsc::Sender<()>,
    cleanup: tokio::sync::mpsc::Sender<()>,
}

impl Triggers {
    pub fn reconcile(&self) {
        if self.reconcile.try_send(()).is_ok() {
            tracing::debug!("triggered a reconcile pass");
        }
    }

    pub fn cleanup(&self) {
        if self.cleanup.try_send(()).is_ok() {
            tracing::debug!("triggered a cleanup pass");
        }
    }
}

/// PoolProvisioner keeps a warm pool of ready vector collections mirrored by
/// ledger rows, so binding a knowledge base never waits on collection
/// creation. It owns the VectorCollection lifecycle end to end.
pub struct PoolProvisioner<V> {
    pool: sqlx::PgPool,
    store: V,
    config: PoolConfig,
}

impl<V: VectorStore> PoolProvisioner<V> {
    pub fn new(pool: sqlx::PgPool, store: V, config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            pool,
            store,
            config,
        })
    }

    /// Spawn the reconcile and cleanup workers, returning their triggers.
    /// Workers exit when `cancel` fires; pending triggers are dropped.
    pub fn start(
        self: Arc<Self>,
        cancel: CancellationToken,
    ) -> (Triggers, Vec<tokio::task::JoinHandle<()>>) {
        let (reconcile_tx, reconcile_rx) = tokio::sync::mpsc::channel(1);
        let (cleanup_tx, cleanup_rx) = tokio::sync::mpsc::channel(1);

        let handles = vec![
            tokio::spawn(self.clone().reconcile_worker(reconcile_rx, cancel.clone())),
            tokio::spawn(self.cleanup_worker(cleanup_rx, cancel)),
        ];

        (
            Triggers {
                reconcile: reconcile_tx,
                cleanup: cleanup_tx,
            },
            handles,
        )
    }

    /// Provision a single collection: ledger row first, then the collection
    /// itself, then the AVAILABLE transition. A failed create deletes the
    /// row again; a failed transition leaves PROVISIONING for the cleanup
    /// pass to reclaim.
    pub async fn provision_one(&self) -> anyhow::Result<()> {
        let collection_name = generate_collection_name();

        let mut conn = self.pool.acquire().await?;
        let record_id = ledger_sql::collections::insert_provisioning(&mut conn, &collection_name)
            .await
            .context("initiating collection record")?;
        drop(conn);

        if let Err(err) = self.store.create_collection(&collection_name).await {
            tracing::error!(collection_name, ?err, "failed to create collection");

            // Compensate by deleting the record; if even that fails, mark
            // it FAILED so the cleanup worker reclaims it.
            let mut conn = self.pool.acquire().await?;
            if let Err(cleanup_err) =
                ledger_sql::collections::delete_row(&mut conn, record_id).await
            {
                tracing::error!(
                    record_id,
                    ?cleanup_err,
                    "failed to roll back record of failed collection"
                );
                if let Err(mark_err) =
                    ledger_sql::collections::mark_failed(&mut conn, record_id).await
                {
                    tracing::error!(record_id, ?mark_err, "failed to mark record FAILED");
                }
            }
            return Err(err).context("creating collection in vector store");
        }

        let mut conn = self.pool.acquire().await?;
        let transitioned = ledger_sql::collections::mark_available(&mut conn, record_id)
            .await
            .context("finalizing provisioned collection")?;
        anyhow::ensure!(
            transitioned,
            "collection record {record_id} vanished before finalization"
        );

        tracing::info!(collection_name, record_id, "provisioned a collection");
        Ok(())
    }

    /// One reconcile pass: top the pool up to `min_pool_size`, counting
    /// fresh PROVISIONING rows as pending capacity. Individual provisioning
    /// failures are logged; the pass errors only if every task failed.
    pub async fn reconcile(&self) -> anyhow::Result<()> {
        let counts = ledger_sql::collections::pool_counts(
            &self.pool,
            self.config.provisioning_threshold_minutes,
        )
        .await
        .context("counting pool collections")?;

        let ready = (counts.available + counts.provisioning) as usize;
        if ready >= self.config.min_pool_size {
            return Ok(());
        }
        let needed = (self.config.min_pool_size - ready)
            .min(self.config.max_pool_size.saturating_sub(ready));

        tracing::info!(
            available = counts.available,
            provisioning = counts.provisioning,
            needed,
            "topping up collection pool"
        );

        let failures = futures::stream::iter(0..needed)
            .map(|_| async move {
                match self.provision_one().await {
                    Ok(()) => false,
                    Err(err) => {
                        tracing::error!(?err, "failed to provision a collection");
                        true
                    }
                }
            })
            .buffer_unordered(self.config.max_concurrent)
            .filter(|failed| futures::future::ready(*failed))
            .count()
            .await;

        anyhow::ensure!(
            failures < needed,
            "every provisioning task in this pass failed ({failures})"
        );
        tracing::info!("reconcile pass finished");
        Ok(())
    }

    /// One cleanup pass: physically drop and then delete every reclaimable
    /// collection. A failed drop keeps the row so the next pass retries.
    pub async fn cleanup(&self) -> anyhow::Result<()> {
        let candidates =
            ledger_sql::collections::cleanup_candidates(&self.pool, STUCK_PROVISIONING_MINUTES)
                .await
                .context("querying collections for cleanup")?;

        if candidates.is_empty() {
            return Ok(());
        }
        tracing::info!(count = candidates.len(), "found collections for cleanup");

        let failures = futures::stream::iter(candidates)
            .map(|candidate| async move {
                match self
                    .cleanup_one(candidate.id, &candidate.collection_name)
                    .await
                {
                    Ok(()) => false,
                    Err(err) => {
                        tracing::error!(?err, "failed to clean up a collection");
                        true
                    }
                }
            })
            .buffer_unordered(self.config.max_concurrent)
            .filter(|failed| futures::future::ready(*failed))
            .count()
            .await;

        anyhow::ensure!(failures == 0, "cleanup pass finished with {failures} errors");
        tracing::info!("cleanup pass finished");
        Ok(())
    }

    async fn cleanup_one(&self, record_id: models::Id, collection_name: &str) -> anyhow::Result<()> {
        self.store
            .drop_collection(collection_name)
            .await
            .context("dropping collection in vector store")?;

        let mut conn = self.pool.acquire().await?;
        ledger_sql::collections::delete_row(&mut conn, record_id)
            .await
            .context("deleting record of dropped collection")?;

        tracing::info!(collection_name, record_id, "reclaimed a collection");
        Ok(())
    }

    async fn reconcile_worker(
        self: Arc<Self>,
        mut trigger: tokio::sync::mpsc::Receiver<()>,
        cancel: CancellationToken,
    ) {
        tracing::info!("reconcile worker started");
        if let Err(err) = self.reconcile().await {
            tracing::error!(?err, "initial reconcile failed, worker continues");
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                received = tokio::time::timeout(RECONCILE_FALLBACK, trigger.recv()) => {
                    match received {
                        Ok(Some(())) => {
                            // Coalesce signals that raced in behind this one.
                            while trigger.try_recv().is_ok() {}
                        }
                        Ok(None) => break,
                        Err(_elapsed) => {
                            tracing::debug!("starting periodic reconcile");
                        }
                    }
                }
            }

            if let Err(err) = self.reconcile().await {
                tracing::error!(?err, "reconcile pass failed");
            }
        }
        tracing::info!("reconcile worker stopped");
    }

    async fn cleanup_worker(
        self: Arc<Self>,
        mut trigger: tokio::sync::mpsc::Receiver<()>,
        cancel: CancellationToken,
    ) {
        tracing::info!("cleanup worker started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                received = trigger.recv() => {
                    if received.is_none() {
                        break;
                    }
                    while trigger.try_recv().is_ok() {}
                }
            }

            if let Err(err) = self.cleanup().await {
                tracing::error!(?err, "cleanup pass failed");
            }
        }
        tracing::info!("cleanup worker stopped");
    }
}

/// Collection names are opaque: an underscore plus 16 random alphanumerics.
fn generate_collection_name() -> String {
    format!(
        "_{}",
        Alphanumeric.sample_string(&mut rand::thread_rng(), 16)
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn collection_names_are_opaque_and_unique() {
        let a = generate_collection_name();
        let b = generate_collection_name();

        assert!(a.starts_with('_'));
        assert_eq!(a.len(), 17);
        assert!(a[1..].chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn triggers_coalesce_onto_one_slot() {
        let (reconcile, mut reconcile_rx) = tokio::sync::mpsc::channel(1);
        let (cleanup, _cleanup_rx) = tokio::sync::mpsc::channel(1);
        let triggers = Triggers { reconcile, cleanup };

        triggers.reconcile();
        triggers.reconcile();
        triggers.reconcile();

        assert!(reconcile_rx.try_recv().is_ok());
        assert!(reconcile_rx.try_recv().is_err());
    }
}
