//! Local embedding provider backed by fastembed.
//!
//! The model is loaded lazily on first use; inference runs on the blocking
//! thread pool since fastembed is synchronous.

use std::path::PathBuf;
use std::sync::Arc;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::RwLock;
use tokio::task;
use tracing::info;

use crate::config::ConfigError;

use super::{EmbeddingError, EmbeddingProvider};

/// Supported local models mapped to their vector lengths.
fn resolve_model(name: &str) -> Option<(EmbeddingModel, usize)> {
    match name {
        "all-MiniLM-L6-v2" => Some((EmbeddingModel::AllMiniLML6V2, 384)),
        "all-MiniLM-L12-v2" => Some((EmbeddingModel::AllMiniLML12V2, 384)),
        "bge-small-en-v1.5" => Some((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Some((EmbeddingModel::BGEBaseENV15, 768)),
        "nomic-embed-text-v1.5" => Some((EmbeddingModel::NomicEmbedTextV15, 768)),
        "multilingual-e5-small" => Some((EmbeddingModel::MultilingualE5Small, 384)),
        _ => None,
    }
}

/// Lazily-initialized fastembed provider.
pub struct FastembedProvider {
    model_name: EmbeddingModel,
    dimensions: usize,
    cache_dir: Option<PathBuf>,
    model: Arc<RwLock<Option<Arc<TextEmbedding>>>>,
}

impl FastembedProvider {
    /// Build from configuration. Unknown models are fatal at startup.
    pub fn from_config(model: &str, cache_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        let (model_name, dimensions) =
            resolve_model(model).ok_or_else(|| ConfigError::UnsupportedModel(model.to_string()))?;
        Ok(Self {
            model_name,
            dimensions,
            cache_dir,
            model: Arc::new(RwLock::new(None)),
        })
    }

    async fn model(&self) -> Result<Arc<TextEmbedding>, EmbeddingError> {
        if let Some(model) = self.model.read().await.as_ref() {
            return Ok(Arc::clone(model));
        }

        let mut slot = self.model.write().await;
        // Another caller may have finished loading while we waited.
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }

        info!(model = ?self.model_name, "loading local embedding model");
        let model_name = self.model_name.clone();
        let cache_dir = self.cache_dir.clone();
        let model = task::spawn_blocking(move || {
            let mut options =
                InitOptions::new(model_name).with_show_download_progress(false);
            if let Some(dir) = cache_dir {
                options = options.with_cache_dir(dir);
            }
            TextEmbedding::try_new(options).map_err(|e| EmbeddingError::ModelInit(e.to_string()))
        })
        .await??;

        let model = Arc::new(model);
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FastembedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let model = self.model().await?;
        let text = text.to_string();

        let mut vectors = task::spawn_blocking(move || {
            model
                .embed(vec![text], None)
                .map_err(|e| EmbeddingError::Generation(e.to_string()))
        })
        .await??;

        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Generation("empty embedding result".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model().await?;
        let texts = texts.to_vec();

        task::spawn_blocking(move || {
            model
                .embed(texts, None)
                .map_err(|e| EmbeddingError::Generation(e.to_string()))
        })
        .await?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
