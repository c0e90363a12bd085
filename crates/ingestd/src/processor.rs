use crate::loaders::LoaderRegistry;
use chunker::SemanticChunker;
use embeddings::Embeddings;
use futures::StreamExt;
use models::{chunk_vector_id, Id, IngestionFile, JobMessage, OperationStatus};
use object_store::ObjectStore;
use std::path::Path;
use std::sync::Arc;
use vector_store::{ChunkEntity, VectorStore};

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("invalid file extension on {0:?}")]
    InvalidFileExtension(String),
    #[error("document could not be loaded")]
    NotLoaded(#[from] crate::loaders::Error),
    #[error("no chunks were produced from the document")]
    NotChunked,
    #[error("loader task failed")]
    LoaderPanicked,
    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),
    #[error(transparent)]
    VectorStore(#[from] vector_store::Error),
    #[error(transparent)]
    Embeddings(#[from] embeddings::Error),
    #[error(transparent)]
    Chunker(#[from] chunker::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Processor executes one dequeued ingestion message: indexing and deletion
/// sub-tasks run in parallel with bounded per-file concurrency, per-file
/// outcomes are collected, and the ledger is updated in one final
/// transaction. Only a fully recorded outcome lets the consumer ack.
pub struct Processor<S, V, E> {
    pool: sqlx::PgPool,
    object_store: Arc<S>,
    vector_store: Arc<V>,
    embedder: Arc<E>,
    chunker: SemanticChunker<Arc<E>>,
    loaders: Arc<LoaderRegistry>,
    max_concurrent: usize,
}

impl<S, V, E> Processor<S, V, E>
where
    S: ObjectStore,
    V: VectorStore,
    E: Embeddings,
{
    pub fn new(
        pool: sqlx::PgPool,
        object_store: Arc<S>,
        vector_store: Arc<V>,
        embedder: Arc<E>,
        chunker_config: chunker::ChunkerConfig,
        loaders: LoaderRegistry,
        max_concurrent: usize,
    ) -> Self {
        Self {
            pool,
            object_store,
            vector_store,
            chunker: SemanticChunker::new(embedder.clone(), chunker_config),
            embedder,
            loaders: Arc::new(loaders),
            max_concurrent,
        }
    }

    pub async fn process(&self, message: JobMessage) -> anyhow::Result<()> {
        let job_id = message.ingestion_job_id;
        let index_files = message.index_kb_doc_id.clone().unwrap_or_default();
        let delete_files = message.delete_kb_doc_id.clone().unwrap_or_default();

        let (index_results, delete_results) = tokio::join!(
            self.index_many(
                &index_files,
                message.user_id,
                &message.category,
                &message.collection_name,
            ),
            self.delete_many(&delete_files, &message.collection_name),
        );

        let job_failed = index_results
            .iter()
            .chain(delete_results.iter())
            .any(|(_, status)| *status == OperationStatus::Failed);

        if let Err(err) = self
            .record_outcome(job_id, &index_results, &delete_results, job_failed)
            .await
        {
            tracing::error!(
                job_id,
                ?err,
                "critical: failed to record ingestion outcome"
            );
            self.mark_job_failed(job_id).await;
            return Err(err.into());
        }

        tracing::info!(
            job_id,
            indexed = index_results.len(),
            deleted = delete_results.len(),
            job_failed,
            "processed ingestion message"
        );
        Ok(())
    }

    /// Index every file of the manifest, `max_concurrent` at a time.
    /// Individual failures become per-file FAILED results and never abort
    /// the batch.
    async fn index_many(
        &self,
        files: &[IngestionFile],
        user_id: Id,
        category: &str,
        collection_name: &str,
    ) -> Vec<(Id, OperationStatus)> {
        let futures_vec: Vec<_> = files
            .iter()
            .map(|file| async move {
                match self
                    .index_one(file, user_id, category, collection_name)
                    .await
                {
                    Ok(()) => {
                        tracing::info!(kb_doc_id = file.kb_doc_id, "indexed document");
                        (file.kb_doc_id, OperationStatus::Success)
                    }
                    Err(err) => {
                        tracing::error!(kb_doc_id = file.kb_doc_id, ?err, "failed to index document");
                        (file.kb_doc_id, OperationStatus::Failed)
                    }
                }
            })
            .collect();
        futures::stream::iter(futures_vec)
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }

    async fn delete_many(
        &self,
        files: &[IngestionFile],
        collection_name: &str,
    ) -> Vec<(Id, OperationStatus)> {
        let futures_vec: Vec<_> = files
            .iter()
            .map(|file| async move {
                match self.delete_one(file, collection_name).await {
                    Ok(()) => {
                        tracing::info!(kb_doc_id = file.kb_doc_id, "deleted document entities");
                        (file.kb_doc_id, OperationStatus::Success)
                    }
                    Err(err) => {
                        tracing::error!(
                            kb_doc_id = file.kb_doc_id,
                            ?err,
                            "failed to delete document entities"
                        );
                        (file.kb_doc_id, OperationStatus::Failed)
                    }
                }
            })
            .collect();
        futures::stream::iter(futures_vec)
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }

    async fn index_one(
        &self,
        file: &IngestionFile,
        user_id: Id,
        category: &str,
        collection_name: &str,
    ) -> Result<(), FileError> {
        models::extension_of(&file.file_name)
            .filter(|extension| models::is_allowed_extension(extension))
            .ok_or_else(|| FileError::InvalidFileExtension(file.file_name.clone()))?;

        let path = self.object_store.download_to_temp(&file.object_key).await?;
        let result = self
            .index_downloaded(&path, file, user_id, category, collection_name)
            .await;

        if let Err(err) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), ?err, "failed to remove temp file");
        }
        result
    }

    async fn index_downloaded(
        &self,
        path: &Path,
        file: &IngestionFile,
        user_id: Id,
        category: &str,
        collection_name: &str,
    ) -> Result<(), FileError> {
        // Loaders do blocking file I/O; keep them off the async workers.
        let loaders = self.loaders.clone();
        let load_path = path.to_owned();
        let units = tokio::task::spawn_blocking(move || loaders.load(&load_path))
            .await
            .map_err(|_| FileError::LoaderPanicked)??;

        let chunked = self.chunker.chunk_units(&units).await?;
        if chunked.is_empty() {
            return Err(FileError::NotChunked);
        }

        let child_texts: Vec<String> = chunked
            .iter()
            .flat_map(|chunk| chunk.children.iter().cloned())
            .collect();
        let child_vectors = embeddings::embed_batched(&self.embedder, &child_texts).await?;
        let mut vectors = child_vectors.into_iter();

        let mut txn = self.pool.begin().await?;

        // Replace any prior ingestion of this file: parent rows are fresh
        // identities, so stale chunks must go or a redelivered message
        // would accumulate entities instead of converging.
        ledger_sql::chunks::delete_parent_chunks(&mut txn, file.doc_id).await?;

        let mut entities = Vec::with_capacity(child_texts.len());

        for chunk in &chunked {
            let parent_id =
                ledger_sql::chunks::insert_parent_chunk(&mut txn, file.doc_id, &chunk.parent)
                    .await?;

            for (chunk_index, child) in chunk.children.iter().enumerate() {
                let vector = vectors.next().expect("one embedding per child chunk");
                entities.push(ChunkEntity {
                    id: chunk_vector_id(&file.file_name, parent_id, chunk_index),
                    text_dense_vector: vector,
                    text_content: child.clone(),
                    object_key: file.object_key.clone(),
                    category: category.to_string(),
                    file_name: file.file_name.clone(),
                    user_id,
                    file_id: file.kb_doc_id,
                    parent_id,
                });
            }
        }

        // Vector-store writes happen before COMMIT so a failure rolls the
        // parent rows back and leaves the link FAILED for a retry.
        let filter = format!("file_id == {}", file.kb_doc_id);
        self.vector_store
            .delete_by_filter(collection_name, &filter)
            .await?;
        self.vector_store.upsert(collection_name, &entities).await?;
        txn.commit().await?;

        Ok(())
    }

    async fn delete_one(&self, file: &IngestionFile, collection_name: &str) -> Result<(), FileError> {
        let filter = format!("file_id == {}", file.kb_doc_id);
        self.vector_store
            .delete_by_filter(collection_name, &filter)
            .await?;

        let mut txn = self.pool.begin().await?;
        ledger_sql::chunks::delete_parent_chunks(&mut txn, file.doc_id).await?;
        txn.commit().await?;

        Ok(())
    }

    /// The single transaction recording this message's outcome: link
    /// statuses for the index list, link removal or failure for the delete
    /// list, and the job's terminal status.
    async fn record_outcome(
        &self,
        job_id: Id,
        index_results: &[(Id, OperationStatus)],
        delete_results: &[(Id, OperationStatus)],
        job_failed: bool,
    ) -> sqlx::Result<()> {
        let (indexed_ok, indexed_failed) = split_by_status(index_results);
        let (deleted_ok, deleted_failed) = split_by_status(delete_results);

        let mut txn = self.pool.begin().await?;

        if !indexed_ok.is_empty() || !indexed_failed.is_empty() {
            ledger_sql::ingestion::set_link_statuses(&mut txn, &indexed_ok, &indexed_failed)
                .await?;
        }
        if !deleted_ok.is_empty() {
            ledger_sql::ingestion::delete_links(&mut txn, &deleted_ok).await?;
        }
        if !deleted_failed.is_empty() {
            ledger_sql::ingestion::fail_links(&mut txn, &deleted_failed).await?;
        }

        let job_status = if job_failed {
            OperationStatus::Failed
        } else {
            OperationStatus::Success
        };
        ledger_sql::ingestion::set_job_status(&mut txn, job_id, job_status).await?;

        txn.commit().await
    }

    /// Best-effort terminal state when the outcome transaction itself
    /// failed. The message stays un-acked either way.
    async fn mark_job_failed(&self, job_id: Id) {
        let result = async {
            let mut conn = self.pool.acquire().await?;
            ledger_sql::ingestion::set_job_status(&mut conn, job_id, OperationStatus::Failed).await
        }
        .await;

        if let Err(err) = result {
            tracing::error!(job_id, ?err, "failed to mark job as failed");
        }
    }
}

fn split_by_status(results: &[(Id, OperationStatus)]) -> (Vec<Id>, Vec<Id>) {
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for (id, status) in results {
        match status {
            OperationStatus::Failed => failed.push(*id),
            _ => succeeded.push(*id),
        }
    }
    (succeeded, failed)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn results_split_by_status() {
        let results = vec![
            (1, OperationStatus::Success),
            (2, OperationStatus::Failed),
            (3, OperationStatus::Success),
        ];
        let (ok, failed) = split_by_status(&results);
        assert_eq!(ok, vec![1, 3]);
        assert_eq!(failed, vec![2]);
    }
}
