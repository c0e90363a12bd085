use models::Id;
use object_store::ObjectStore;
use provisioner::Triggers;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no pooled collection is available, retry shortly")]
    PoolExhausted,
    #[error("knowledge base {0:?} already exists")]
    AlreadyExists(String),
    #[error("knowledge base not found")]
    NotFound,
    #[error("documents {0:?} are linked into a knowledge base")]
    LinkedDocuments(Vec<Id>),
    #[error("duplicate file names in upload")]
    DuplicateFileNames,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug)]
pub struct CreatedKnowledgeBase {
    pub id: Id,
    pub name: String,
    pub collection_name: String,
}

/// KnowledgeService is the synchronous service layer behind the knowledge
/// base and document endpoints: warm-pool binding, uploads, and the
/// two-phase document delete.
pub struct KnowledgeService<S> {
    pool: sqlx::PgPool,
    object_store: Arc<S>,
    triggers: Triggers,
}

impl<S: ObjectStore> KnowledgeService<S> {
    pub fn new(pool: sqlx::PgPool, object_store: Arc<S>, triggers: Triggers) -> Self {
        Self {
            pool,
            object_store,
            triggers,
        }
    }

    /// Create a knowledge base by binding one AVAILABLE pooled collection.
    /// The bind and the insert commit together; a depleted pool surfaces as
    /// PoolExhausted (503-equivalent) and the caller may retry.
    pub async fn create_knowledge_base(
        &self,
        user_id: Id,
        name: &str,
        category: &str,
    ) -> Result<CreatedKnowledgeBase, Error> {
        if name.len() < 5 || name.len() > 50 {
            return Err(Error::InvalidRequest(
                "knowledge base names are 5 to 50 characters".to_string(),
            ));
        }

        let mut txn = self.pool.begin().await?;

        let collection = ledger_sql::collections::bind_available(&mut txn)
            .await?
            .ok_or(Error::PoolExhausted)?;

        let kb_id =
            match ledger_sql::knowledge_bases::insert(&mut txn, user_id, name, category, collection.id)
                .await
            {
                Ok(id) => id,
                Err(err) if ledger_sql::is_unique_violation(&err, "idx_unique_kb_name") => {
                    return Err(Error::AlreadyExists(name.to_string()));
                }
                Err(err) => return Err(err.into()),
            };

        txn.commit().await?;

        // The pool just shrank by one; top it back up.
        self.triggers.reconcile();

        tracing::info!(kb_id, user_id, "created knowledge base");
        Ok(CreatedKnowledgeBase {
            id: kb_id,
            name: name.to_string(),
            collection_name: collection.collection_name,
        })
    }

    /// Delete a knowledge base and hand its collection to the cleanup
    /// worker for the physical drop.
    pub async fn delete_knowledge_base(&self, user_id: Id, kb_id: Id) -> Result<(), Error> {
        let mut txn = self.pool.begin().await?;

        let collection_id = ledger_sql::knowledge_bases::delete(&mut txn, user_id, kb_id)
            .await?
            .ok_or(Error::NotFound)?;
        ledger_sql::collections::release_for_cleanup(&mut txn, collection_id).await?;

        txn.commit().await?;

        self.triggers.cleanup();

        tracing::info!(kb_id, user_id, "deleted knowledge base");
        Ok(())
    }

    /// Admit uploads: register locked PENDING documents and return one
    /// presigned PUT URL per file. The client reports outcomes through
    /// `finalize_uploads`.
    pub async fn admit_uploads(
        &self,
        user_id: Id,
        file_names: &[String],
    ) -> Result<Vec<(Id, String)>, Error> {
        if file_names.is_empty() {
            return Err(Error::InvalidRequest(
                "at least one file name is required".to_string(),
            ));
        }
        for file_name in file_names {
            if models::content_type_for(file_name).is_none() {
                return Err(Error::InvalidRequest(format!(
                    "file type of {file_name:?} is not allowed"
                )));
            }
        }

        let files: Vec<_> = file_names
            .iter()
            .map(|file_name| ledger_sql::documents::CreateDocument {
                user_id,
                file_name: file_name.clone(),
                object_key: format!("{user_id}/{file_name}"),
            })
            .collect();

        let mut txn = self.pool.begin().await?;
        let created = match ledger_sql::documents::create_documents(&mut txn, &files).await {
            Ok(created) => created,
            Err(err) if ledger_sql::is_unique_violation(&err, "idx_unique_filename") => {
                return Err(Error::DuplicateFileNames);
            }
            Err(err) => return Err(err.into()),
        };
        txn.commit().await?;

        let mut urls = Vec::with_capacity(created.len());
        for document in &created {
            let object_key = format!("{user_id}/{}", document.file_name);
            let url = self
                .object_store
                .presigned_upload_url(&object_key, &document.file_name)
                .await?;
            urls.push((document.id, url));
        }

        tracing::info!(user_id, files = urls.len(), "admitted document uploads");
        Ok(urls)
    }

    /// Client callback after uploading: unlock the documents and record
    /// which uploads succeeded.
    pub async fn finalize_uploads(
        &self,
        user_id: Id,
        successful: &[Id],
        failed: &[Id],
    ) -> Result<(), Error> {
        let mut txn = self.pool.begin().await?;
        ledger_sql::documents::finalize_documents(&mut txn, user_id, successful, failed).await?;
        txn.commit().await?;
        Ok(())
    }

    /// A user's knowledge bases, with the total count for pagination.
    pub async fn list_knowledge_bases(
        &self,
        user_id: Id,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ledger_sql::knowledge_bases::KnowledgeBaseRow>, i64), Error> {
        Ok(ledger_sql::knowledge_bases::list(&self.pool, user_id, limit, offset).await?)
    }

    /// A user's stable (uploaded and finalized) documents.
    pub async fn list_documents(
        &self,
        user_id: Id,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ledger_sql::documents::DocumentRow>, i64), Error> {
        Ok(ledger_sql::documents::list_documents(&self.pool, user_id, limit, offset).await?)
    }

    /// Successfully ingested documents of one knowledge base.
    pub async fn list_knowledge_base_documents(
        &self,
        user_id: Id,
        kb_id: Id,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ledger_sql::knowledge_bases::KnowledgeBaseDocumentRow>, i64), Error> {
        if kb_id <= 0 {
            return Err(Error::InvalidRequest(
                "a knowledge base id is required".to_string(),
            ));
        }
        Ok(
            ledger_sql::knowledge_bases::list_documents(&self.pool, user_id, kb_id, limit, offset)
                .await?,
        )
    }

    /// Two-phase document delete: lock the rows and collect object keys,
    /// remove the objects, then remove the rows. Documents still linked
    /// into a knowledge base are refused.
    pub async fn delete_documents(&self, user_id: Id, document_ids: &[Id]) -> Result<(), Error> {
        if document_ids.is_empty() {
            return Err(Error::InvalidRequest(
                "at least one document id is required".to_string(),
            ));
        }

        let mut txn = self.pool.begin().await?;

        let linked = ledger_sql::documents::linked_documents(&mut txn, document_ids).await?;
        if !linked.is_empty() {
            return Err(Error::LinkedDocuments(linked));
        }

        let object_keys =
            ledger_sql::documents::lock_documents(&mut txn, document_ids, user_id).await?;
        txn.commit().await?;

        // If this fails the rows stay locked-PENDING; the reaper will probe
        // the objects and settle them on its next pass.
        self.object_store.delete_objects(&object_keys).await?;

        let mut txn = self.pool.begin().await?;
        ledger_sql::documents::remove_documents(&mut txn, document_ids, user_id).await?;
        txn.commit().await?;

        tracing::info!(user_id, documents = document_ids.len(), "deleted documents");
        Ok(())
    }

    /// Operator view of the warm pool.
    pub async fn pool_stats(
        &self,
    ) -> Result<Vec<ledger_sql::collections::PoolStatRow>, Error> {
        Ok(ledger_sql::collections::pool_stats(&self.pool).await?)
    }
}
