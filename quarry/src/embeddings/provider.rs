use async_trait::async_trait;

use crate::config::EmbeddingsConfig;
use crate::error::{QuarryError, Result};

use super::api::EmbeddingApiClient;

/// Pluggable embedding provider. Dimensionality is fixed per deployment;
/// startup refuses on a mismatch with the stored collections.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn dimensions(&self) -> usize;

    /// Convenience for single-query embedding.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed(std::slice::from_ref(&text.to_string())).await?;
        embeddings
            .pop()
            .ok_or_else(|| QuarryError::Embedding("Provider returned no embedding".into()))
    }
}

/// Production embedder backed by an OpenAI-compatible `/embeddings`
/// endpoint. Batches are split at the configured size; each batch retries
/// independently.
pub struct ApiEmbedder {
    client: EmbeddingApiClient,
    dimensions: usize,
    batch_size: usize,
}

impl ApiEmbedder {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        if config.dimensions == 0 {
            return Err(QuarryError::Validation(
                "EMBEDDING_DIMENSIONS must be positive".into(),
            ));
        }

        Ok(Self {
            client: EmbeddingApiClient::new(config)?,
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
        })
    }
}

#[async_trait]
impl Embedder for ApiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let batch_embeddings = self.client.embed(batch).await?;
            for embedding in &batch_embeddings {
                if embedding.len() != self.dimensions {
                    return Err(QuarryError::Embedding(format!(
                        "Provider returned {}-dimensional embedding, expected {}",
                        embedding.len(),
                        self.dimensions
                    )));
                }
            }
            embeddings.extend(batch_embeddings);
        }

        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
