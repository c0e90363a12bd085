mod entity;
mod schema;

pub use entity::ChunkEntity;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("vector store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("vector store rejected {operation} (code {code}): {message}")]
    Rejected {
        operation: String,
        code: i64,
        message: String,
    },
    #[error("invalid vector store endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// VectorStore is the write-side gateway to the vector database. The search
/// path is out of scope; collections are created, filled, and dropped here.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync + 'static {
    /// Create a collection with the fixed chunk schema and its indexes.
    async fn create_collection(&self, collection_name: &str) -> Result<(), Error>;

    async fn drop_collection(&self, collection_name: &str) -> Result<(), Error>;

    async fn upsert(&self, collection_name: &str, entities: &[ChunkEntity]) -> Result<(), Error>;

    /// Delete entities matching a boolean filter expression. Matching
    /// nothing is a successful deletion.
    async fn delete_by_filter(&self, collection_name: &str, filter: &str) -> Result<(), Error>;
}

#[async_trait::async_trait]
impl<V: VectorStore + ?Sized> VectorStore for std::sync::Arc<V> {
    async fn create_collection(&self, collection_name: &str) -> Result<(), Error> {
        (**self).create_collection(collection_name).await
    }

    async fn drop_collection(&self, collection_name: &str) -> Result<(), Error> {
        (**self).drop_collection(collection_name).await
    }

    async fn upsert(&self, collection_name: &str, entities: &[ChunkEntity]) -> Result<(), Error> {
        (**self).upsert(collection_name, entities).await
    }

    async fn delete_by_filter(&self, collection_name: &str, filter: &str) -> Result<(), Error> {
        (**self).delete_by_filter(collection_name, filter).await
    }
}

/// Client for the Milvus HTTP API (v2 vectordb endpoints).
pub struct MilvusClient {
    http: reqwest::Client,
    base: url::Url,
    token: Option<String>,
    database: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MilvusResponse {
    code: i64,
    #[serde(default)]
    message: String,
}

impl MilvusClient {
    pub fn new(
        base: url::Url,
        user: Option<String>,
        password: Option<String>,
        database: Option<String>,
    ) -> Self {
        let token = match (user, password) {
            (Some(user), Some(password)) => Some(format!("{user}:{password}")),
            _ => None,
        };

        Self {
            http: reqwest::Client::new(),
            base,
            token,
            database,
        }
    }

    async fn post(
        &self,
        operation: &str,
        path: &str,
        mut body: serde_json::Value,
    ) -> Result<(), Error> {
        if let Some(database) = &self.database {
            body["dbName"] = serde_json::Value::String(database.clone());
        }

        let mut request = self.http.post(self.base.join(path)?).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response: MilvusResponse = request.send().await?.error_for_status()?.json().await?;

        if response.code != 0 {
            return Err(Error::Rejected {
                operation: operation.to_string(),
                code: response.code,
                message: response.message,
            });
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl VectorStore for MilvusClient {
    async fn create_collection(&self, collection_name: &str) -> Result<(), Error> {
        self.post(
            "create collection",
            "v2/vectordb/collections/create",
            schema::create_collection_request(collection_name),
        )
        .await?;

        tracing::info!(collection_name, "created vector collection");
        Ok(())
    }

    async fn drop_collection(&self, collection_name: &str) -> Result<(), Error> {
        self.post(
            "drop collection",
            "v2/vectordb/collections/drop",
            serde_json::json!({ "collectionName": collection_name }),
        )
        .await?;

        tracing::info!(collection_name, "dropped vector collection");
        Ok(())
    }

    async fn upsert(&self, collection_name: &str, entities: &[ChunkEntity]) -> Result<(), Error> {
        if entities.is_empty() {
            return Ok(());
        }

        self.post(
            "upsert",
            "v2/vectordb/entities/upsert",
            serde_json::json!({
                "collectionName": collection_name,
                "data": entities,
            }),
        )
        .await?;

        tracing::info!(
            collection_name,
            entities = entities.len(),
            "upserted chunk entities"
        );
        Ok(())
    }

    async fn delete_by_filter(&self, collection_name: &str, filter: &str) -> Result<(), Error> {
        self.post(
            "delete",
            "v2/vectordb/entities/delete",
            serde_json::json!({
                "collectionName": collection_name,
                "filter": filter,
            }),
        )
        .await?;

        tracing::info!(collection_name, filter, "deleted chunk entities");
        Ok(())
    }
}
