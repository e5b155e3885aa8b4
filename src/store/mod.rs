//! Persistent Stores
//!
//! Two independently-owned SQLite-backed stores: the lexical store holds the
//! authoritative fact records plus a full-text index kept in lockstep, and
//! the vector store holds an append-only embedding collection. There is no
//! transaction spanning both; the orchestrator duplicates writes
//! best-effort and accepts divergence under partial failure.

pub mod lexical;
pub mod vector;

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::classify::DecayClass;

pub use lexical::LexicalStore;
pub use vector::VectorStore;

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}

/// What kind of statement a fact records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactCategory {
    Preference,
    Fact,
    Decision,
    Entity,
    Other,
}

impl FactCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            FactCategory::Preference => "preference",
            FactCategory::Fact => "fact",
            FactCategory::Decision => "decision",
            FactCategory::Entity => "entity",
            FactCategory::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "preference" => Some(FactCategory::Preference),
            "fact" => Some(FactCategory::Fact),
            "decision" => Some(FactCategory::Decision),
            "entity" => Some(FactCategory::Entity),
            "other" => Some(FactCategory::Other),
            _ => None,
        }
    }
}

/// The authoritative fact record, owned by the lexical store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryFact {
    pub id: String,
    pub text: String,
    pub category: FactCategory,
    pub importance: f64,
    pub entity: Option<String>,
    pub attribute: Option<String>,
    pub value: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub decay_class: DecayClass,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_confirmed_at: DateTime<Utc>,
    pub confidence: f64,
}

/// Input for creating a fact. The store assigns id and timestamps and
/// resolves the decay class and expiry.
#[derive(Debug, Clone)]
pub struct NewFact {
    pub text: String,
    pub category: FactCategory,
    /// Caller-clamped to [0,1]; the store does not clamp.
    pub importance: f64,
    pub entity: Option<String>,
    pub attribute: Option<String>,
    pub value: Option<String>,
    pub source: String,
    /// When set, skips the decay classifier.
    pub decay_override: Option<DecayClass>,
    /// When set, replaces the TTL-derived expiry outright (including an
    /// explicit `None` for "never expires").
    pub expires_override: Option<Option<DateTime<Utc>>>,
    pub confidence: f64,
}

impl NewFact {
    /// A plain fact with defaulted metadata.
    pub fn new(text: impl Into<String>, category: FactCategory) -> Self {
        Self {
            text: text.into(),
            category,
            importance: 0.5,
            entity: None,
            attribute: None,
            value: None,
            source: "manual".to_string(),
            decay_override: None,
            expires_override: None,
            confidence: 1.0,
        }
    }
}

/// A record in the vector store. Its id space is independent of
/// [`MemoryFact::id`]; the stores are not foreign-keyed to each other.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub importance: f64,
    pub category: FactCategory,
    pub created_at: DateTime<Utc>,
}

/// Input for appending a vector record.
#[derive(Debug, Clone)]
pub struct NewVectorRecord {
    pub text: String,
    pub vector: Vec<f32>,
    pub importance: f64,
    pub category: FactCategory,
}

pub(crate) fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    // WAL keeps readers unblocked during writes; the busy timeout covers the
    // window where another handle holds the write lock.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(conn)
}

pub(crate) fn timestamp_ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn datetime_from_ms(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::CorruptRecord(format!("timestamp out of range: {ms}")))
}
