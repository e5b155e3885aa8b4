//! Embedding Providers
//!
//! Text-to-vector generation behind one trait. The provider is chosen at
//! configuration time: a remote OpenAI-compatible API or a local model.
//! Everything downstream treats embedding as an opaque async function from
//! text to a fixed-length vector.

pub mod mock;
pub mod remote;

#[cfg(feature = "local-embeddings")]
pub mod local;

use std::sync::Arc;

use crate::config::{ConfigError, EmbeddingConfig};

pub use mock::MockEmbeddingProvider;
pub use remote::OpenAiEmbeddingProvider;

/// Embedding errors. Recovered locally by the recall/capture paths.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding API error: {0}")]
    Api(String),

    #[error("embedding API rate limited")]
    RateLimited,

    #[error("failed to initialize embedding model: {0}")]
    ModelInit(String),

    #[error("failed to generate embedding: {0}")]
    Generation(String),

    #[error("blocking task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Converts text to a fixed-length vector.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for several texts. The default runs sequentially;
    /// providers with a batch endpoint override this.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Vector length produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Build the configured provider. Configuration failures are fatal.
pub fn build_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
    match config {
        EmbeddingConfig::Remote { api_key, model } => {
            Ok(Arc::new(OpenAiEmbeddingProvider::from_config(
                api_key.as_deref(),
                model,
            )?))
        }
        #[cfg(feature = "local-embeddings")]
        EmbeddingConfig::Local { model, cache_dir } => Ok(Arc::new(
            local::FastembedProvider::from_config(model, cache_dir.clone())?,
        )),
        #[cfg(not(feature = "local-embeddings"))]
        EmbeddingConfig::Local { .. } => {
            Err(ConfigError::ProviderUnavailable("local", "local-embeddings"))
        }
    }
}
