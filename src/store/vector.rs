//! Vector record store.
//!
//! Append-only embedding collection with nearest-neighbor search. The
//! backing table is created lazily on first use; concurrent first calls
//! collapse into a single initialization through a `OnceCell`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{
    datetime_from_ms, open_connection, timestamp_ms, FactCategory, NewVectorRecord, StoreError,
    VectorRecord,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS vector_records (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    vector BLOB NOT NULL,
    importance REAL NOT NULL DEFAULT 0.5,
    category TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
"#;

#[derive(Clone)]
enum Location {
    Disk(PathBuf),
    Memory,
}

/// SQLite-backed append-only vector index. Cloning yields a handle to the
/// same underlying database.
#[derive(Clone)]
pub struct VectorStore {
    location: Location,
    dimension: usize,
    db: Arc<OnceCell<RwLock<Connection>>>,
}

impl VectorStore {
    /// Create a handle for the store at `path`. No I/O happens until the
    /// first operation.
    pub fn new(path: impl AsRef<Path>, dimension: usize) -> Self {
        Self {
            location: Location::Disk(path.as_ref().to_path_buf()),
            dimension,
            db: Arc::new(OnceCell::new()),
        }
    }

    /// An in-memory store, used by tests.
    pub fn new_in_memory(dimension: usize) -> Self {
        Self {
            location: Location::Memory,
            dimension,
            db: Arc::new(OnceCell::new()),
        }
    }

    /// The embedding dimension this store accepts.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    async fn conn(&self) -> Result<&RwLock<Connection>, StoreError> {
        self.db
            .get_or_try_init(|| async {
                let conn = match &self.location {
                    Location::Disk(path) => open_connection(path)?,
                    Location::Memory => Connection::open_in_memory()?,
                };
                conn.execute_batch(SCHEMA)?;
                debug!(dimension = self.dimension, "vector store initialized");
                Ok(RwLock::new(conn))
            })
            .await
    }

    /// Append a record, assigning id and creation timestamp.
    pub async fn store(&self, input: NewVectorRecord) -> Result<VectorRecord, StoreError> {
        if input.vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: input.vector.len(),
            });
        }

        let record = VectorRecord {
            id: Uuid::new_v4().to_string(),
            text: input.text,
            vector: input.vector,
            importance: input.importance,
            category: input.category,
            created_at: Utc::now(),
        };

        let db = self.conn().await?;
        let db = db.write().await;
        db.execute(
            "INSERT INTO vector_records (id, text, vector, importance, category, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.text,
                vector_to_blob(&record.vector),
                record.importance,
                record.category.as_str(),
                timestamp_ms(record.created_at),
            ],
        )?;

        debug!(id = %record.id, "vector record stored");
        Ok(record)
    }

    /// Nearest neighbors to `query`, scored as `1 / (1 + distance)` with
    /// cosine distance, filtered to `score >= min_score`, best first.
    pub async fn search(
        &self,
        query: &[f32],
        limit: usize,
        min_score: f64,
    ) -> Result<Vec<(VectorRecord, f64)>, StoreError> {
        if query.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let db = self.conn().await?;
        let db = db.read().await;
        let mut stmt = db.prepare(
            "SELECT id, text, vector, importance, category, created_at FROM vector_records",
        )?;
        let rows = stmt.query_map([], |row| Ok(row_to_record(row)))?;

        let mut scored = Vec::new();
        for row in rows {
            let record = row??;
            let distance = 1.0 - cosine_similarity(query, &record.vector);
            let score = 1.0 / (1.0 + distance);
            if score >= min_score {
                scored.push((record, score));
            }
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Total record count.
    pub async fn count(&self) -> Result<usize, StoreError> {
        let db = self.conn().await?;
        let db = db.read().await;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM vector_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

fn blob_to_vector(blob: &[u8]) -> Result<Vec<f32>, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::CorruptRecord(format!(
            "vector blob length {} not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn row_to_record(row: &Row<'_>) -> Result<VectorRecord, StoreError> {
    let category_str: String = row.get(4).map_err(StoreError::Sqlite)?;
    let blob: Vec<u8> = row.get(2).map_err(StoreError::Sqlite)?;
    Ok(VectorRecord {
        id: row.get(0).map_err(StoreError::Sqlite)?,
        text: row.get(1).map_err(StoreError::Sqlite)?,
        vector: blob_to_vector(&blob)?,
        importance: row.get(3).map_err(StoreError::Sqlite)?,
        category: FactCategory::from_str(&category_str)
            .ok_or_else(|| StoreError::CorruptRecord(format!("category: {category_str}")))?,
        created_at: datetime_from_ms(row.get(5).map_err(StoreError::Sqlite)?)?,
    })
}
