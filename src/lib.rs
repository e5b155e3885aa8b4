//! mnemon: memory and recall engine for conversational agents
//!
//! Persists short natural-language facts extracted from conversations and
//! retrieves the subset relevant to a new prompt, so an agent can behave as
//! if it remembers the user across sessions.
//!
//! Two complementary local indexes back retrieval: an FTS5 lexical index for
//! exact/token matches and a vector index for semantic matches. Each stored
//! fact carries a decay class controlling its time-to-live; access renews
//! the lifetime of stable and active facts, and pruning removes expired
//! ones. Capture is gated: injection-shaped or markup-shaped text is vetoed
//! before it can ever be replayed into a conversation.

pub mod classify;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod logging;
pub mod recall;
pub mod store;

pub use classify::{CaptureDecision, DecayClass, Triple};
pub use config::{ConfigError, EmbeddingConfig, MemoryConfig, StorageConfig};
pub use embedding::{EmbeddingError, EmbeddingProvider};
pub use engine::{
    EngineError, MemoryEngine, MemoryStats, MessageContent, MessageRole, RecallReport,
    StoreAction, TurnMessage,
};
pub use recall::{Backend, RecalledMemory};
pub use store::{FactCategory, LexicalStore, MemoryFact, StoreError, VectorStore};
