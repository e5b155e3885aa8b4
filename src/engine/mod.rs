//! Recall/Capture Orchestrator
//!
//! Coordinates the stores, the embedding provider, and the classifiers
//! around the two turn-boundary events. The lifecycle hooks are
//! best-effort: an internal failure degrades to "no context" / "no capture"
//! and is logged, never surfaced to the host. The explicit capability and
//! administrative operations do surface errors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classify::{evaluate_capture, extract_triple, CaptureDecision, DEFAULT_MAX_CAPTURE_LEN};
use crate::config::{ConfigError, MemoryConfig};
use crate::embedding::{build_provider, EmbeddingError, EmbeddingProvider};
use crate::recall::{merge_results, render_context_block, Backend, RecalledMemory};
use crate::store::{
    FactCategory, LexicalStore, NewFact, NewVectorRecord, StoreError, VectorStore,
};

/// Default number of memories returned by recall.
const DEFAULT_RECALL_LIMIT: usize = 5;

/// Prompts shorter than this are not worth a recall round-trip.
const MIN_RECALL_PROMPT_LEN: usize = 4;

/// Score floor for vector recall hits. With cosine distance, orthogonal
/// embeddings score exactly 0.5, so the floor must sit above that. A tunable
/// default, not an invariant.
const VECTOR_MIN_SCORE: f64 = 0.6;

/// Score at or above which a stored text counts as a near-duplicate.
const DUPLICATE_MIN_SCORE: f64 = 0.95;

/// Capture candidates processed per turn, to cap embedding cost.
const MAX_CAPTURE_CANDIDATES: usize = 5;

/// Engine errors surfaced by the explicit operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Role of a turn message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A typed content block within a message. Only `text` blocks are consulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Message content: a plain string or a list of typed blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One message of a finished turn, as handed over by the host runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMessage {
    pub role: MessageRole,
    pub content: MessageContent,
}

impl TurnMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Text segments of this message, if user-authored.
    fn user_text_segments(&self) -> Vec<&str> {
        if self.role != MessageRole::User {
            return Vec::new();
        }
        match &self.content {
            MessageContent::Text(text) => vec![text.as_str()],
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter(|b| b.kind == "text")
                .filter_map(|b| b.text.as_deref())
                .collect(),
        }
    }
}

/// Result of the explicit recall operation.
#[derive(Debug, Clone, Serialize)]
pub struct RecallReport {
    /// Human-readable ranked summary.
    pub summary: String,
    /// Machine-readable number of memories found.
    pub count: usize,
}

/// Result of the explicit store operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum StoreAction {
    Created { id: String },
    Duplicate,
}

/// Record counts of the two stores.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub fact_count: usize,
    pub vector_count: usize,
}

/// The memory engine: both stores, the embedding provider, and the
/// capture/recall logic composed around them.
pub struct MemoryEngine {
    config: MemoryConfig,
    lexical: LexicalStore,
    vector: VectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl MemoryEngine {
    /// Build the engine from configuration. Configuration problems (missing
    /// credential, unsupported model) and storage-open failures are fatal.
    pub fn new(config: MemoryConfig) -> Result<Self, EngineError> {
        let embedder = build_provider(&config.embedding)?;
        let lexical = LexicalStore::open(config.storage.fact_db_path())?;
        let vector = VectorStore::new(config.storage.vector_db_path(), embedder.dimensions());
        Ok(Self {
            config,
            lexical,
            vector,
            embedder,
        })
    }

    /// Assemble an engine from pre-built parts. Used by tests and by hosts
    /// that manage their own stores.
    pub fn with_components(
        config: MemoryConfig,
        lexical: LexicalStore,
        vector: VectorStore,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            config,
            lexical,
            vector,
            embedder,
        }
    }

    fn max_capture_len(&self) -> usize {
        self.config.max_capture_length.unwrap_or(DEFAULT_MAX_CAPTURE_LEN)
    }

    // ------------------------------------------------------------------
    // Recall
    // ------------------------------------------------------------------

    /// Query both indexes and fuse the results into one ranking.
    ///
    /// Storage errors propagate. An embedding failure only costs the vector
    /// side: the lexical results still come back, and the failure is logged.
    pub async fn recall_ranked(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RecalledMemory>, EngineError> {
        let lexical_hits = self.lexical.search(query, limit).await?;

        let vector_hits = match self.embedder.embed(query).await {
            Ok(embedding) => self
                .vector
                .search(&embedding, limit, VECTOR_MIN_SCORE)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "vector search failed, continuing lexical-only");
                    Vec::new()
                }),
            Err(e) => {
                warn!(error = %e, "query embedding failed, continuing lexical-only");
                Vec::new()
            }
        };

        // Renew the lifetime of the facts we are about to hand back.
        let accessed: Vec<String> = lexical_hits.iter().map(|(f, _)| f.id.clone()).collect();
        if let Err(e) = self.lexical.refresh_accessed(&accessed).await {
            warn!(error = %e, "access refresh failed");
        }

        let lexical = lexical_hits
            .into_iter()
            .map(|(fact, score)| RecalledMemory {
                text: fact.text,
                category: fact.category,
                score,
                backend: Backend::Lexical,
            })
            .collect();
        let vector = vector_hits
            .into_iter()
            .map(|(record, score)| RecalledMemory {
                text: record.text,
                category: record.category,
                score,
                backend: Backend::Vector,
            })
            .collect();

        let mut merged = merge_results(lexical, vector);
        merged.truncate(limit);
        Ok(merged)
    }

    /// Explicit recall operation: ranked summary plus machine count.
    pub async fn recall(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<RecallReport, EngineError> {
        let limit = limit.unwrap_or(DEFAULT_RECALL_LIMIT);
        let memories = self.recall_ranked(query, limit).await?;

        if memories.is_empty() {
            return Ok(RecallReport {
                summary: "No matching memories.".to_string(),
                count: 0,
            });
        }

        let mut summary = String::new();
        for (i, memory) in memories.iter().enumerate() {
            summary.push_str(&format!(
                "{}. [{}] {} (score {:.2}, {})\n",
                i + 1,
                memory.category.as_str(),
                memory.text,
                memory.score,
                match memory.backend {
                    Backend::Lexical => "lexical",
                    Backend::Vector => "vector",
                },
            ));
        }
        Ok(RecallReport {
            summary,
            count: memories.len(),
        })
    }

    /// Turn-start hook. Returns a context block to prepend, or `None`.
    /// Never fails: every internal error degrades to "no context".
    pub async fn before_turn(&self, prompt: &str) -> Option<String> {
        if !self.config.auto_recall {
            return None;
        }
        let prompt = prompt.trim();
        if prompt.chars().count() < MIN_RECALL_PROMPT_LEN {
            return None;
        }

        match self.recall_ranked(prompt, DEFAULT_RECALL_LIMIT).await {
            Ok(memories) if memories.is_empty() => None,
            Ok(memories) => {
                debug!(count = memories.len(), "recalled context for turn");
                Some(render_context_block(&memories))
            }
            Err(e) => {
                warn!(error = %e, "recall failed, continuing without context");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Capture
    // ------------------------------------------------------------------

    /// Explicit store operation with near-duplicate detection.
    pub async fn remember(
        &self,
        text: &str,
        importance: Option<f64>,
        category: Option<FactCategory>,
    ) -> Result<StoreAction, EngineError> {
        self.store_fact(text, importance, category, "explicit").await
    }

    /// Turn-end hook. Scans user-authored text for facts worth keeping.
    /// Never fails; per-candidate errors are logged and skipped.
    pub async fn after_turn(&self, success: bool, messages: &[TurnMessage]) {
        if !self.config.auto_capture {
            return;
        }
        debug!(success, messages = messages.len(), "scanning turn for capture");

        let candidates: Vec<&str> = messages
            .iter()
            .flat_map(|m| m.user_text_segments())
            .take(MAX_CAPTURE_CANDIDATES)
            .collect();

        for candidate in candidates {
            match evaluate_capture(candidate, self.max_capture_len()) {
                CaptureDecision::Accept => {
                    match self.store_fact(candidate, None, None, "conversation").await {
                        Ok(StoreAction::Created { id }) => {
                            debug!(%id, "captured fact from turn");
                        }
                        Ok(StoreAction::Duplicate) => {
                            debug!("capture candidate already stored");
                        }
                        Err(e) => {
                            warn!(error = %e, "capture failed, skipping candidate");
                        }
                    }
                }
                CaptureDecision::Reject(reason) => {
                    debug!(?reason, "capture candidate rejected");
                }
            }
        }
    }

    /// Shared capture path: classify, embed, dedupe, write both stores.
    async fn store_fact(
        &self,
        text: &str,
        importance: Option<f64>,
        category: Option<FactCategory>,
        source: &str,
    ) -> Result<StoreAction, EngineError> {
        let text = text.trim();
        let importance = importance.unwrap_or(0.5).clamp(0.0, 1.0);

        let triple = extract_triple(text);
        let category = category.unwrap_or_else(|| infer_category(triple.as_ref()));

        let embedding = self.embedder.embed(text).await?;
        let near = self
            .vector
            .search(&embedding, 1, DUPLICATE_MIN_SCORE)
            .await?;
        if let Some((existing, score)) = near.first() {
            debug!(id = %existing.id, score, "near-duplicate found, skipping store");
            return Ok(StoreAction::Duplicate);
        }

        let fact = self
            .lexical
            .store(NewFact {
                text: text.to_string(),
                category,
                importance,
                entity: triple.as_ref().map(|t| t.entity.clone()),
                attribute: triple.as_ref().map(|t| t.attribute.clone()),
                value: triple.as_ref().map(|t| t.value.clone()),
                source: source.to_string(),
                decay_override: None,
                expires_override: None,
                confidence: 1.0,
            })
            .await?;

        // Best-effort duplication: a vector-side failure leaves the stores
        // diverged rather than failing the write.
        if let Err(e) = self
            .vector
            .store(NewVectorRecord {
                text: text.to_string(),
                vector: embedding,
                importance,
                category,
            })
            .await
        {
            warn!(error = %e, id = %fact.id, "vector write failed, stores diverged");
        }

        Ok(StoreAction::Created { id: fact.id })
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// Record counts of both stores. Storage errors propagate: there is no
    /// safe degraded answer for an administrative query.
    pub async fn stats(&self) -> Result<MemoryStats, EngineError> {
        Ok(MemoryStats {
            fact_count: self.lexical.count().await?,
            vector_count: self.vector.count().await?,
        })
    }

    /// Remove expired facts. Returns the number removed.
    pub async fn prune_expired(&self) -> Result<usize, EngineError> {
        Ok(self.lexical.prune_expired().await?)
    }
}

/// Map an extracted triple onto a fact category.
fn infer_category(triple: Option<&crate::classify::Triple>) -> FactCategory {
    match triple {
        Some(t) if t.entity == "user" && t.attribute == "prefer" => FactCategory::Preference,
        Some(t) if t.entity == "decision" => FactCategory::Decision,
        Some(t) if t.entity == "convention" => FactCategory::Fact,
        Some(_) => FactCategory::Entity,
        None => FactCategory::Other,
    }
}
