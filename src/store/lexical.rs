//! Lexical fact store.
//!
//! Durable storage and ranked full-text search over facts. The primary
//! `facts` table and the `facts_fts` FTS5 index are written inside one
//! transaction per logical operation so they cannot drift apart.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::classify::{classify_decay, DecayClass};

use super::{
    datetime_from_ms, open_connection, timestamp_ms, FactCategory, MemoryFact, NewFact, StoreError,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS facts (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    category TEXT NOT NULL,
    importance REAL NOT NULL DEFAULT 0.5,
    entity TEXT,
    attribute TEXT,
    value TEXT,
    source TEXT NOT NULL DEFAULT 'manual',
    created_at INTEGER NOT NULL,
    decay_class TEXT NOT NULL,
    expires_at INTEGER,
    last_confirmed_at INTEGER NOT NULL,
    confidence REAL NOT NULL DEFAULT 1.0
);

CREATE INDEX IF NOT EXISTS idx_facts_expires ON facts(expires_at);
"#;

// External-content-free FTS table managed manually alongside `facts`.
const FTS_SCHEMA: &str =
    "CREATE VIRTUAL TABLE IF NOT EXISTS facts_fts USING fts5(id UNINDEXED, text, tokenize='unicode61')";

const FACT_COLUMNS: &str = "id, text, category, importance, entity, attribute, value, source, \
     created_at, decay_class, expires_at, last_confirmed_at, confidence";

/// SQLite-backed fact store with an FTS5 lexical index. Cloning yields a
/// handle to the same underlying database.
#[derive(Clone)]
pub struct LexicalStore {
    db: Arc<RwLock<Connection>>,
}

impl LexicalStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = open_connection(path.as_ref())?;
        Self::with_connection(conn)
    }

    /// An in-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        conn.execute(FTS_SCHEMA, [])?;
        Ok(Self {
            db: Arc::new(RwLock::new(conn)),
        })
    }

    /// Persist a new fact, assigning id and timestamps and resolving its
    /// decay class and expiry.
    pub async fn store(&self, input: NewFact) -> Result<MemoryFact, StoreError> {
        self.store_at(input, Utc::now()).await
    }

    /// [`LexicalStore::store`] with an explicit creation instant.
    pub async fn store_at(
        &self,
        input: NewFact,
        now: DateTime<Utc>,
    ) -> Result<MemoryFact, StoreError> {
        let decay_class = input.decay_override.unwrap_or_else(|| {
            classify_decay(
                input.entity.as_deref(),
                input.attribute.as_deref(),
                input.value.as_deref(),
                &input.text,
            )
        });
        let expires_at = match input.expires_override {
            Some(explicit) => explicit,
            None => decay_class.ttl().map(|ttl| now + ttl),
        };

        let fact = MemoryFact {
            id: Uuid::new_v4().to_string(),
            text: input.text,
            category: input.category,
            importance: input.importance,
            entity: input.entity,
            attribute: input.attribute,
            value: input.value,
            source: input.source,
            created_at: now,
            decay_class,
            expires_at,
            last_confirmed_at: now,
            confidence: input.confidence,
        };

        let mut db = self.db.write().await;
        let tx = db.transaction()?;
        tx.execute(
            "INSERT INTO facts (id, text, category, importance, entity, attribute, value, source, \
             created_at, decay_class, expires_at, last_confirmed_at, confidence) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                fact.id,
                fact.text,
                fact.category.as_str(),
                fact.importance,
                fact.entity,
                fact.attribute,
                fact.value,
                fact.source,
                timestamp_ms(fact.created_at),
                fact.decay_class.as_str(),
                fact.expires_at.map(timestamp_ms),
                timestamp_ms(fact.last_confirmed_at),
                fact.confidence,
            ],
        )?;
        tx.execute(
            "INSERT INTO facts_fts (id, text) VALUES (?1, ?2)",
            params![fact.id, fact.text],
        )?;
        tx.commit()?;

        debug!(id = %fact.id, decay = fact.decay_class.as_str(), "fact stored");
        Ok(fact)
    }

    /// Ranked full-text search, excluding expired facts.
    ///
    /// Scores are a monotonic transform of the FTS5 bm25 rank into (0,1),
    /// higher is better.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(MemoryFact, f64)>, StoreError> {
        let Some(fts_query) = sanitize_match_query(query) else {
            return Ok(Vec::new());
        };
        let now_ms = timestamp_ms(Utc::now());

        let db = self.db.read().await;
        let mut stmt = db.prepare(
            "SELECT f.id, f.text, f.category, f.importance, f.entity, f.attribute, f.value, \
                    f.source, f.created_at, f.decay_class, f.expires_at, f.last_confirmed_at, \
                    f.confidence, facts_fts.rank \
             FROM facts_fts \
             JOIN facts f ON f.id = facts_fts.id \
             WHERE facts_fts MATCH ?1 \
               AND (f.expires_at IS NULL OR f.expires_at > ?2) \
             ORDER BY facts_fts.rank \
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(params![fts_query, now_ms, limit as i64], |row| {
            let rank: f64 = row.get(13)?;
            Ok((row_to_fact(row), rank))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (fact, rank) = row?;
            // FTS5 rank is negative bm25; better matches are more negative.
            let relevance = -rank;
            let score = relevance / (1.0 + relevance);
            results.push((fact?, score.max(0.0)));
        }
        Ok(results)
    }

    /// Direct lookup by id, including expired facts.
    pub async fn get(&self, id: &str) -> Result<Option<MemoryFact>, StoreError> {
        let db = self.db.read().await;
        let result = db.query_row(
            &format!("SELECT {FACT_COLUMNS} FROM facts WHERE id = ?1"),
            params![id],
            |row| Ok(row_to_fact(row)),
        );
        match result {
            Ok(fact) => Ok(Some(fact?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Renew the lifetime of accessed facts.
    pub async fn refresh_accessed(&self, ids: &[String]) -> Result<(), StoreError> {
        self.refresh_accessed_at(ids, Utc::now()).await
    }

    /// [`LexicalStore::refresh_accessed`] at an explicit instant.
    ///
    /// One UPDATE statement covers the whole batch, so `last_confirmed_at`
    /// and `expires_at` can never be observed out of sync. Only `stable` and
    /// `active` facts are touched.
    pub async fn refresh_accessed_at(
        &self,
        ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let now_ms = timestamp_ms(now);
        let stable_exp = timestamp_ms(now + DecayClass::Stable.ttl().expect("stable has a TTL"));
        let active_exp = timestamp_ms(now + DecayClass::Active.ttl().expect("active has a TTL"));

        let placeholders: Vec<String> =
            (0..ids.len()).map(|i| format!("?{}", i + 4)).collect();
        let sql = format!(
            "UPDATE facts \
             SET last_confirmed_at = ?1, \
                 expires_at = CASE decay_class WHEN 'stable' THEN ?2 ELSE ?3 END \
             WHERE decay_class IN ('stable', 'active') AND id IN ({})",
            placeholders.join(", ")
        );

        let mut values: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(now_ms), Box::new(stable_exp), Box::new(active_exp)];
        for id in ids {
            values.push(Box::new(id.clone()));
        }
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();

        let db = self.db.write().await;
        let refreshed = db.execute(&sql, param_refs.as_slice())?;
        debug!(requested = ids.len(), refreshed, "access refresh");
        Ok(())
    }

    /// Delete every fact whose expiry is in the past. Returns the count.
    pub async fn prune_expired(&self) -> Result<usize, StoreError> {
        self.prune_expired_at(Utc::now()).await
    }

    /// [`LexicalStore::prune_expired`] at an explicit instant.
    pub async fn prune_expired_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let now_ms = timestamp_ms(now);

        let mut db = self.db.write().await;
        let tx = db.transaction()?;
        tx.execute(
            "DELETE FROM facts_fts WHERE id IN \
             (SELECT id FROM facts WHERE expires_at IS NOT NULL AND expires_at < ?1)",
            params![now_ms],
        )?;
        let deleted = tx.execute(
            "DELETE FROM facts WHERE expires_at IS NOT NULL AND expires_at < ?1",
            params![now_ms],
        )?;
        tx.commit()?;

        debug!(deleted, "pruned expired facts");
        Ok(deleted)
    }

    /// Total fact count, expired rows included.
    pub async fn count(&self) -> Result<usize, StoreError> {
        let db = self.db.read().await;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM facts", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Reduce a free-text query to FTS5-safe bareword tokens joined with OR.
/// Tokens are lower-cased so a literal "OR"/"NOT" in the query cannot be
/// parsed as an operator. Returns `None` when nothing searchable remains.
fn sanitize_match_query(query: &str) -> Option<String> {
    let sanitized: String = query
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let tokens: Vec<&str> = sanitized.split_whitespace().collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

fn row_to_fact(row: &Row<'_>) -> Result<MemoryFact, StoreError> {
    let category_str: String = row.get(2).map_err(StoreError::Sqlite)?;
    let decay_str: String = row.get(9).map_err(StoreError::Sqlite)?;
    Ok(MemoryFact {
        id: row.get(0).map_err(StoreError::Sqlite)?,
        text: row.get(1).map_err(StoreError::Sqlite)?,
        category: FactCategory::from_str(&category_str)
            .ok_or_else(|| StoreError::CorruptRecord(format!("category: {category_str}")))?,
        importance: row.get(3).map_err(StoreError::Sqlite)?,
        entity: row.get(4).map_err(StoreError::Sqlite)?,
        attribute: row.get(5).map_err(StoreError::Sqlite)?,
        value: row.get(6).map_err(StoreError::Sqlite)?,
        source: row.get(7).map_err(StoreError::Sqlite)?,
        created_at: datetime_from_ms(row.get(8).map_err(StoreError::Sqlite)?)?,
        decay_class: DecayClass::from_str(&decay_str)
            .ok_or_else(|| StoreError::CorruptRecord(format!("decay class: {decay_str}")))?,
        expires_at: row
            .get::<_, Option<i64>>(10)
            .map_err(StoreError::Sqlite)?
            .map(datetime_from_ms)
            .transpose()?,
        last_confirmed_at: datetime_from_ms(row.get(11).map_err(StoreError::Sqlite)?)?,
        confidence: row.get(12).map_err(StoreError::Sqlite)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn fact(text: &str) -> NewFact {
        NewFact::new(text, FactCategory::Fact)
    }

    // The store persists millisecond precision; comparisons against
    // round-tripped rows need an ms-aligned instant.
    fn now_ms() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap()
    }

    #[tokio::test]
    async fn store_assigns_id_and_timestamps() {
        let store = LexicalStore::open_in_memory().unwrap();
        let stored = store.store(fact("the backend uses postgres")).await.unwrap();

        assert!(!stored.id.is_empty());
        assert_eq!(stored.last_confirmed_at, stored.created_at);
        // "uses" marks a stable technology fact: 90-day TTL.
        assert_eq!(stored.decay_class, DecayClass::Stable);
        assert_eq!(
            stored.expires_at,
            Some(stored.created_at + Duration::days(90))
        );
    }

    #[tokio::test]
    async fn permanent_facts_never_expire() {
        let store = LexicalStore::open_in_memory().unwrap();
        let stored = store
            .store(fact("her email is kim@example.com"))
            .await
            .unwrap();
        assert_eq!(stored.decay_class, DecayClass::Permanent);
        assert_eq!(stored.expires_at, None);
    }

    #[tokio::test]
    async fn caller_override_beats_classifier() {
        let store = LexicalStore::open_in_memory().unwrap();
        let mut input = fact("her email is kim@example.com");
        input.decay_override = Some(DecayClass::Session);
        let stored = store.store(input).await.unwrap();

        assert_eq!(stored.decay_class, DecayClass::Session);
        assert_eq!(
            stored.expires_at,
            Some(stored.created_at + Duration::hours(24))
        );
    }

    #[tokio::test]
    async fn explicit_null_expiry_override() {
        let store = LexicalStore::open_in_memory().unwrap();
        let mut input = fact("debugging the socket test right now");
        input.expires_override = Some(None);
        let stored = store.store(input).await.unwrap();

        // Non-permanent class with an explicitly cleared expiry.
        assert_eq!(stored.decay_class, DecayClass::Session);
        assert_eq!(stored.expires_at, None);
    }

    #[tokio::test]
    async fn search_ranks_and_scores_in_unit_interval() {
        let store = LexicalStore::open_in_memory().unwrap();
        store.store(fact("I prefer dark mode")).await.unwrap();
        store.store(fact("the sprint goal is search")).await.unwrap();

        let results = store.search("dark mode", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        let (hit, score) = &results[0];
        assert_eq!(hit.text, "I prefer dark mode");
        assert!(*score > 0.0 && *score <= 1.0, "score {score} out of range");
    }

    #[tokio::test]
    async fn search_excludes_expired() {
        let store = LexicalStore::open_in_memory().unwrap();
        let mut stale = fact("the old port was 8080");
        stale.expires_override = Some(Some(Utc::now() - Duration::hours(1)));
        store.store(stale).await.unwrap();

        let results = store.search("port 8080", 10).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_with_unsearchable_query_is_empty() {
        let store = LexicalStore::open_in_memory().unwrap();
        store.store(fact("I prefer dark mode")).await.unwrap();
        assert!(store.search("!!! ???", 10).await.unwrap().is_empty());
        assert!(store.search("", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_extends_stable_and_active_only() {
        let store = LexicalStore::open_in_memory().unwrap();
        let t0 = now_ms();

        let mut stable = fact("the project uses rust");
        stable.decay_override = Some(DecayClass::Stable);
        let mut session = fact("debugging flaky test right now");
        session.decay_override = Some(DecayClass::Session);
        let stable = store.store_at(stable, t0).await.unwrap();
        let session = store.store_at(session, t0).await.unwrap();

        let t1 = t0 + Duration::days(5);
        store
            .refresh_accessed_at(&[stable.id.clone(), session.id.clone()], t1)
            .await
            .unwrap();

        let stable = store.get(&stable.id).await.unwrap().unwrap();
        assert_eq!(stable.last_confirmed_at, t1);
        assert_eq!(stable.expires_at, Some(t1 + Duration::days(90)));

        // Session facts are untouched.
        let session = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(session.last_confirmed_at, t0);
        assert_eq!(session.expires_at, Some(t0 + Duration::hours(24)));
    }

    #[tokio::test]
    async fn refresh_is_idempotent_at_one_instant() {
        let store = LexicalStore::open_in_memory().unwrap();
        let t0 = now_ms();
        let mut input = fact("currently porting the scheduler");
        input.decay_override = Some(DecayClass::Active);
        let stored = store.store_at(input, t0).await.unwrap();

        let t1 = t0 + Duration::days(1);
        let ids = [stored.id.clone()];
        store.refresh_accessed_at(&ids, t1).await.unwrap();
        let first = store.get(&stored.id).await.unwrap().unwrap();
        store.refresh_accessed_at(&ids, t1).await.unwrap();
        let second = store.get(&stored.id).await.unwrap().unwrap();

        assert_eq!(first.expires_at, second.expires_at);
        assert_eq!(first.expires_at, Some(t1 + Duration::days(14)));
    }

    #[tokio::test]
    async fn prune_removes_exactly_the_expired() {
        let store = LexicalStore::open_in_memory().unwrap();
        let t0 = now_ms();

        let mut short = fact("temporary debug flag is on");
        short.decay_override = Some(DecayClass::Checkpoint); // 4h TTL
        let short = store.store_at(short, t0).await.unwrap();
        let keep = store.store_at(fact("her phone is 555-0100"), t0).await.unwrap();

        // One millisecond before expiry nothing is pruned.
        let removed = store
            .prune_expired_at(t0 + Duration::hours(4))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        let removed = store
            .prune_expired_at(t0 + Duration::hours(4) + Duration::milliseconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(&short.id).await.unwrap().is_none());
        assert!(store.get(&keep.id).await.unwrap().is_some());

        // The lexical index is pruned in lockstep.
        assert!(store.search("temporary debug flag", 10).await.unwrap().is_empty());
    }

    #[test]
    fn match_query_sanitization() {
        assert_eq!(sanitize_match_query("Dark Mode!").as_deref(), Some("dark OR mode"));
        // A literal OR in the query is demoted to a plain term.
        assert_eq!(sanitize_match_query("cats OR").as_deref(), Some("cats OR or"));
        assert_eq!(sanitize_match_query("?!  "), None);
    }

    #[tokio::test]
    async fn count_tracks_stores() {
        let store = LexicalStore::open_in_memory().unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        store.store(fact("I prefer tabs")).await.unwrap();
        store.store(fact("we chose postgres")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
