//! Remote embedding provider (OpenAI-compatible API).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{resolve_secret, ConfigError};

use super::{EmbeddingError, EmbeddingProvider};

const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Known models and their vector lengths. Anything else is rejected at
/// startup.
fn model_dimensions(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        "text-embedding-ada-002" => Some(1536),
        _ => None,
    }
}

/// Provider backed by the OpenAI embeddings endpoint.
#[derive(Debug)]
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingProvider {
    /// Build from configuration. The key may be a literal, an `env:VAR`
    /// reference, or absent (falling back to `OPENAI_API_KEY`).
    pub fn from_config(api_key: Option<&str>, model: &str) -> Result<Self, ConfigError> {
        let dimensions = model_dimensions(model)
            .ok_or_else(|| ConfigError::UnsupportedModel(model.to_string()))?;

        let api_key = match api_key {
            Some(value) => resolve_secret(value)?,
            None => std::env::var(API_KEY_ENV).map_err(|_| ConfigError::MissingApiKey)?,
        };
        if api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.to_string(),
            dimensions,
        })
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(EMBEDDINGS_URL)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Api(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingError::RateLimited);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api(format!("{status}: {body}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Api(e.to_string()))?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::Generation("empty embedding response".to_string()))?;

        if vector.len() != self.dimensions {
            return Err(EmbeddingError::Generation(format!(
                "model returned {} dimensions, expected {}",
                vector.len(),
                self.dimensions
            )));
        }

        debug!(model = %self.model, dimension = vector.len(), "embedding generated");
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_dimensions() {
        assert_eq!(model_dimensions("text-embedding-3-small"), Some(1536));
        assert_eq!(model_dimensions("text-embedding-3-large"), Some(3072));
        assert_eq!(model_dimensions("made-up-model"), None);
    }

    #[test]
    fn unsupported_model_is_fatal() {
        let err = OpenAiEmbeddingProvider::from_config(Some("sk-x"), "made-up-model").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedModel(_)));
    }

    #[test]
    fn missing_key_is_fatal() {
        let err = OpenAiEmbeddingProvider::from_config(Some(""), "text-embedding-3-small")
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
    }

    #[test]
    fn env_reference_resolution() {
        std::env::set_var("MNEMON_REMOTE_TEST_KEY", "sk-from-env");
        let provider = OpenAiEmbeddingProvider::from_config(
            Some("env:MNEMON_REMOTE_TEST_KEY"),
            "text-embedding-3-small",
        )
        .unwrap();
        assert_eq!(provider.dimensions(), 1536);
    }
}
