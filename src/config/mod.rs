//! Typed configuration
//!
//! The already-validated settings shape consumed by the engine. Parsing the
//! configuration file belongs to the host; this module only defines the
//! structure, defaults, and startup validation. Validation failures are
//! fatal: the engine never starts on a partial configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration errors. Raised at startup, never recovered.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing API key for the remote embedding provider")]
    MissingApiKey,

    #[error("environment variable '{0}' referenced by the configuration is not set")]
    UnresolvedEnvironment(String),

    #[error("unsupported embedding model '{0}'")]
    UnsupportedModel(String),

    #[error("embedding provider '{0}' requires the '{1}' cargo feature")]
    ProviderUnavailable(&'static str, &'static str),
}

/// Root configuration for the memory engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryConfig {
    /// Embedding provider selection.
    pub embedding: EmbeddingConfig,

    /// Storage locations for the two backends.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Scan turn messages for facts worth keeping.
    #[serde(default = "default_true")]
    pub auto_capture: bool,

    /// Inject recalled context at turn start.
    #[serde(default = "default_true")]
    pub auto_recall: bool,

    /// Maximum capture candidate length in characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_capture_length: Option<usize>,
}

fn default_true() -> bool {
    true
}

/// Embedding provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "camelCase")]
pub enum EmbeddingConfig {
    /// Remote embedding API (OpenAI-compatible).
    #[serde(rename_all = "camelCase")]
    Remote {
        /// Literal key, or an `env:VAR` reference resolved at startup.
        /// Falls back to `OPENAI_API_KEY` when absent.
        #[serde(skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
        model: String,
    },
    /// Local model inference.
    #[serde(rename_all = "camelCase")]
    Local {
        model: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_dir: Option<PathBuf>,
    },
}

/// Storage locations for the two stores. Unset paths resolve under the
/// user data directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fact_db: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_db: Option<PathBuf>,
}

impl StorageConfig {
    fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mnemon")
    }

    /// Resolved path of the fact database.
    pub fn fact_db_path(&self) -> PathBuf {
        self.fact_db
            .clone()
            .unwrap_or_else(|| Self::default_dir().join("facts.db"))
    }

    /// Resolved path of the vector database.
    pub fn vector_db_path(&self) -> PathBuf {
        self.vector_db
            .clone()
            .unwrap_or_else(|| Self::default_dir().join("vectors.db"))
    }
}

/// Resolve a configured credential that may be an `env:VAR` reference.
pub(crate) fn resolve_secret(value: &str) -> Result<String, ConfigError> {
    if let Some(var) = value.strip_prefix("env:") {
        std::env::var(var).map_err(|_| ConfigError::UnresolvedEnvironment(var.to_string()))
    } else {
        Ok(value.to_string())
    }
}
