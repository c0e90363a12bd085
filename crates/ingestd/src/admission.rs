use models::{Id, IngestionFile, JobMessage};
use queue::JobQueue;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("knowledge base {0} not found")]
    KnowledgeBaseNotFound(Id),
    #[error("documents not found or not admissible: {0:?}")]
    DocsNotFound(Vec<Id>),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("could not queue ingestion job")]
    QueueUnavailable(#[source] queue::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// An authenticated request to ingest (or delete) a batch of documents
/// against one knowledge base.
#[derive(Debug, Clone)]
pub struct IngestionRequest {
    pub kb_id: Id,
    pub file_ids: Vec<Id>,
}

impl IngestionRequest {
    fn validate(&self) -> Result<(), Error> {
        if self.kb_id <= 0 {
            return Err(Error::InvalidRequest(
                "a knowledge base id is required".to_string(),
            ));
        }
        if self.file_ids.is_empty() {
            return Err(Error::InvalidRequest(
                "at least one file id is required".to_string(),
            ));
        }
        if self.file_ids.iter().any(|id| *id <= 0) {
            return Err(Error::InvalidRequest(
                "file ids must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct AdmittedJob {
    pub ingestion_job_id: Id,
    pub resource_id: uuid::Uuid,
    pub manifest_len: usize,
}

enum JobKind {
    Index,
    Delete,
}

/// AdmissionService is the synchronous entry point of ingestion: it admits a
/// request into the job ledger and hands it to the queue, all-or-nothing.
pub struct AdmissionService<Q> {
    pool: sqlx::PgPool,
    queue: Arc<Q>,
}

impl<Q: JobQueue> AdmissionService<Q> {
    pub fn new(pool: sqlx::PgPool, queue: Arc<Q>) -> Self {
        Self { pool, queue }
    }

    /// Admit an indexing job: create the job row, reset the document links
    /// to PENDING, and publish one message carrying the manifest.
    pub async fn admit_index(
        &self,
        user_id: Id,
        request: IngestionRequest,
    ) -> Result<AdmittedJob, Error> {
        self.admit(user_id, request, JobKind::Index).await
    }

    /// Admit a deletion job for previously ingested documents.
    pub async fn admit_delete(
        &self,
        user_id: Id,
        request: IngestionRequest,
    ) -> Result<AdmittedJob, Error> {
        self.admit(user_id, request, JobKind::Delete).await
    }

    /// The single admission transaction. The queue publish happens before
    /// COMMIT: a failed publish rolls everything back, leaving no orphan
    /// job row and no half-enqueued work.
    async fn admit(
        &self,
        user_id: Id,
        request: IngestionRequest,
        kind: JobKind,
    ) -> Result<AdmittedJob, Error> {
        request.validate()?;
        let IngestionRequest { kb_id, file_ids } = request;

        let mut txn = self.pool.begin().await?;

        let kb = ledger_sql::knowledge_bases::fetch_with_collection(&mut txn, kb_id, user_id)
            .await?
            .ok_or(Error::KnowledgeBaseNotFound(kb_id))?;

        let documents =
            ledger_sql::ingestion::admissible_documents(&mut txn, user_id, &file_ids).await?;
        let found: HashSet<Id> = documents.iter().map(|d| d.id).collect();
        let missing: Vec<Id> = file_ids
            .iter()
            .copied()
            .filter(|id| !found.contains(id))
            .collect();
        if !missing.is_empty() {
            return Err(Error::DocsNotFound(missing));
        }

        let resource_id = uuid::Uuid::new_v4();
        let job_id = ledger_sql::ingestion::insert_job(&mut txn, kb_id, resource_id).await?;

        let links = ledger_sql::ingestion::upsert_links(&mut txn, kb_id, &file_ids).await?;

        let manifest: Vec<IngestionFile> = links
            .iter()
            .map(|link| {
                let doc = documents
                    .iter()
                    .find(|d| d.id == link.document_id)
                    .expect("every admitted link has its document");
                IngestionFile {
                    kb_doc_id: link.id,
                    doc_id: doc.id,
                    file_name: doc.file_name.clone(),
                    object_key: doc.object_key.clone(),
                }
            })
            .collect();

        let manifest_len = manifest.len();
        if manifest_len > 0 {
            let (index_list, delete_list) = match kind {
                JobKind::Index => (Some(manifest), None),
                JobKind::Delete => (None, Some(manifest)),
            };
            let message = JobMessage {
                ingestion_job_id: job_id,
                kb_id,
                collection_name: kb.collection_name.clone(),
                category: kb.category.clone(),
                user_id,
                index_kb_doc_id: index_list,
                delete_kb_doc_id: delete_list,
            };

            // Publish inside the transaction scope: a send failure drops
            // `txn` uncommitted and the ledger never records this job.
            self.queue
                .send(&message)
                .await
                .map_err(Error::QueueUnavailable)?;
        }

        txn.commit().await?;

        tracing::info!(
            job_id,
            kb_id,
            %resource_id,
            manifest_len,
            "admitted ingestion job"
        );
        Ok(AdmittedJob {
            ingestion_job_id: job_id,
            resource_id,
            manifest_len,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn requests_are_validated() {
        let valid = IngestionRequest {
            kb_id: 5,
            file_ids: vec![10, 11],
        };
        assert!(valid.validate().is_ok());

        let no_kb = IngestionRequest {
            kb_id: 0,
            file_ids: vec![10],
        };
        assert!(matches!(no_kb.validate(), Err(Error::InvalidRequest(_))));

        let no_files = IngestionRequest {
            kb_id: 5,
            file_ids: vec![],
        };
        assert!(matches!(no_files.validate(), Err(Error::InvalidRequest(_))));

        let bad_id = IngestionRequest {
            kb_id: 5,
            file_ids: vec![10, -1],
        };
        assert!(matches!(bad_id.validate(), Err(Error::InvalidRequest(_))));
    }
}
