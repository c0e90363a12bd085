use serde::{Deserialize, Serialize};

/// Maximum number of texts sent in one embeddings request. Larger inputs are
/// split into batches embedded concurrently.
pub const EMBED_BATCH_SIZE: usize = 2048;

const OPENAI_EMBEDDINGS_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("embeddings request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("embeddings provider returned {returned} vectors for {expected} inputs")]
    CountMismatch { expected: usize, returned: usize },
    #[error("embedding dimension {actual} does not match expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("invalid embeddings endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Embeddings turns texts into dense vectors of `models::EMBEDDING_DIMENSION`.
/// Implementations must be deterministic for identical inputs, which the
/// chunker relies on for reproducible chunk boundaries.
#[async_trait::async_trait]
pub trait Embeddings: Send + Sync + 'static {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error>;
}

#[async_trait::async_trait]
impl<E: Embeddings + ?Sized> Embeddings for std::sync::Arc<E> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error> {
        (**self).embed(texts).await
    }
}

/// Split `texts` into EMBED_BATCH_SIZE batches, embed them concurrently, and
/// flatten results in input order.
pub async fn embed_batched<E: Embeddings>(
    embeddings: &E,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, Error> {
    let batches = texts
        .chunks(EMBED_BATCH_SIZE)
        .map(|batch| embeddings.embed(batch));

    let results = futures::future::try_join_all(batches).await?;
    Ok(results.into_iter().flatten().collect())
}

pub struct OpenAiEmbeddings {
    http: reqwest::Client,
    endpoint: url::Url,
    api_key: String,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'static str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl OpenAiEmbeddings {
    pub fn new(endpoint: url::Url, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl Embeddings for OpenAiEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response: EmbeddingsResponse = self
            .http
            .post(self.endpoint.join("v1/embeddings")?)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingsRequest {
                model: OPENAI_EMBEDDINGS_MODEL,
                input: texts,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.data.len() != texts.len() {
            return Err(Error::CountMismatch {
                expected: texts.len(),
                returned: response.data.len(),
            });
        }

        let vectors: Vec<Vec<f32>> = response
            .data
            .into_iter()
            .map(|datum| datum.embedding)
            .collect();

        for vector in &vectors {
            if vector.len() != models::EMBEDDING_DIMENSION {
                return Err(Error::DimensionMismatch {
                    expected: models::EMBEDDING_DIMENSION,
                    actual: vector.len(),
                });
            }
        }

        tracing::debug!(texts = texts.len(), "embedded batch");
        Ok(vectors)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Deterministic stand-in: hashes each text into a small vector.
    struct FakeEmbeddings;

    #[async_trait::async_trait]
    impl Embeddings for FakeEmbeddings {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error> {
            Ok(texts
                .iter()
                .map(|text| {
                    let mut acc = 0u32;
                    for b in text.bytes() {
                        acc = acc.wrapping_mul(31).wrapping_add(b as u32);
                    }
                    vec![(acc % 1000) as f32, text.len() as f32]
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn batched_embedding_preserves_order() {
        let texts: Vec<String> = (0..5000).map(|i| format!("text {i}")).collect();
        let flat = embed_batched(&FakeEmbeddings, &texts).await.unwrap();
        let direct = FakeEmbeddings.embed(&texts).await.unwrap();
        assert_eq!(flat, direct);
    }

    #[tokio::test]
    async fn empty_input_embeds_to_nothing() {
        let flat = embed_batched(&FakeEmbeddings, &[]).await.unwrap();
        assert!(flat.is_empty());
    }
}
