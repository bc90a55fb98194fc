//! Dense vector index: flat cosine scan over embedded chunks
//!
//! The reference implementation keeps all records in memory and persists them
//! to a SQLite file under `data/vectors/`. Persistence is atomic: records are
//! written to a temporary database in one transaction, then renamed over the
//! live file.

use crate::error::{ErrorContext, RagError, Result};
use crate::knowledge::types::VectorRecord;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqlitePool, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Database file name inside the vectors directory
const DB_FILE: &str = "vectors.db";

/// A record scored against a query embedding
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub similarity: f32,
}

/// Contract for the dense vector side of retrieval
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert records in order; id collisions replace in place
    fn add_many(&mut self, records: Vec<VectorRecord>) -> Result<()>;

    /// Top-k records by cosine similarity, descending, insertion order on ties
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredRecord>>;

    /// Number of stored records
    fn count(&self) -> usize;

    /// Flush the index to disk
    async fn persist(&self) -> Result<()>;
}

/// In-memory flat-scan index with SQLite persistence
pub struct FlatVectorIndex {
    dir: PathBuf,
    dimension: usize,
    records: Vec<VectorRecord>,
    slots: HashMap<String, usize>,
}

impl FlatVectorIndex {
    /// Create an empty index rooted at `dir` (usually `data/vectors/`)
    pub fn new(dir: impl Into<PathBuf>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::InvalidConfig(
                "embedding dimension must be positive".to_string(),
            ));
        }
        Ok(Self {
            dir: dir.into(),
            dimension,
            records: Vec::new(),
            slots: HashMap::new(),
        })
    }

    /// Load a previously persisted index from `dir`
    pub async fn open(dir: impl Into<PathBuf>, dimension: usize) -> Result<Self> {
        let mut index = Self::new(dir, dimension)?;
        let path = index.dir.join(DB_FILE);
        if !path.exists() {
            return Err(RagError::NotFound(format!(
                "vector index not found at {}",
                path.display()
            )));
        }

        let pool = SqlitePool::connect(&format!("sqlite:{}", path.display()))
            .await
            .with_context("open vector index")?;

        let info = sqlx::query("SELECT dimension FROM store_info")
            .fetch_one(&pool)
            .await
            .with_context("read vector store manifest")?;
        let stored_dimension: i64 = info.get("dimension");
        if stored_dimension as usize != dimension {
            pool.close().await;
            return Err(RagError::InvalidConfig(format!(
                "vector index was built with dimension {}, manifest declares {}",
                stored_dimension, dimension
            )));
        }

        let rows = sqlx::query("SELECT id, content, source, idx, embedding FROM records ORDER BY rowid")
            .fetch_all(&pool)
            .await
            .with_context("load vector records")?;
        pool.close().await;

        for row in rows {
            let id: String = row.get("id");
            let content: String = row.get("content");
            let source: String = row.get("source");
            let idx: i64 = row.get("idx");
            let blob: Vec<u8> = row.get("embedding");

            index.slots.insert(id.clone(), index.records.len());
            index.records.push(VectorRecord {
                id,
                content,
                metadata: crate::knowledge::types::RecordMetadata {
                    source,
                    index: idx as usize,
                },
                embedding: blob_to_embedding(&blob),
            });
        }

        info!(
            count = index.records.len(),
            dimension, "Opened vector index"
        );
        Ok(index)
    }

    /// Calculate cosine similarity between two vectors
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for FlatVectorIndex {
    fn add_many(&mut self, records: Vec<VectorRecord>) -> Result<()> {
        for record in records {
            if record.embedding.len() != self.dimension {
                return Err(RagError::DimensionMismatch {
                    expected: self.dimension,
                    actual: record.embedding.len(),
                });
            }
            match self.slots.get(&record.id) {
                Some(&slot) => self.records[slot] = record,
                None => {
                    self.slots.insert(record.id.clone(), self.records.len());
                    self.records.push(record);
                }
            }
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        if embedding.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        let mut scored: Vec<ScoredRecord> = self
            .records
            .iter()
            .map(|record| ScoredRecord {
                similarity: Self::cosine_similarity(embedding, &record.embedding),
                record: record.clone(),
            })
            .collect();

        // Stable sort keeps insertion order between equal similarities
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        debug!(hits = scored.len(), "Vector query complete");
        Ok(scored)
    }

    fn count(&self) -> usize {
        self.records.len()
    }

    async fn persist(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).with_context("create vectors directory")?;
        let path = self.dir.join(DB_FILE);
        let tmp = self.dir.join(format!("{}.tmp", DB_FILE));
        if tmp.exists() {
            std::fs::remove_file(&tmp).with_context("clear stale vector temp file")?;
        }

        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", tmp.display()))
            .await
            .with_context("create vector store")?;

        sqlx::query(
            r#"
            CREATE TABLE store_info (
                dimension INTEGER NOT NULL,
                record_count INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .with_context("create vector manifest table")?;

        sqlx::query(
            r#"
            CREATE TABLE records (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL,
                idx INTEGER NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .with_context("create vector records table")?;

        let mut tx = pool.begin().await.with_context("begin vector flush")?;

        sqlx::query("INSERT INTO store_info (dimension, record_count, created_at) VALUES (?1, ?2, ?3)")
            .bind(self.dimension as i64)
            .bind(self.records.len() as i64)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .with_context("write vector manifest")?;

        for record in &self.records {
            sqlx::query(
                "INSERT INTO records (id, content, source, idx, embedding) VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&record.id)
            .bind(&record.content)
            .bind(&record.metadata.source)
            .bind(record.metadata.index as i64)
            .bind(embedding_to_blob(&record.embedding))
            .execute(&mut *tx)
            .await
            .with_context("write vector record")?;
        }

        tx.commit().await.with_context("commit vector flush")?;
        pool.close().await;

        std::fs::rename(&tmp, &path).with_context("swap vector store into place")?;
        info!(count = self.records.len(), path = %path.display(), "Persisted vector index");
        Ok(())
    }
}

/// Serialize an embedding as little-endian f32 bytes
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding
        .iter()
        .flat_map(|f| f.to_le_bytes().to_vec())
        .collect()
}

/// Deserialize an embedding from storage
pub fn blob_to_embedding(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Directory used by the builder and runtime for vector artifacts
pub fn vectors_dir(project_dir: &Path) -> PathBuf {
    project_dir.join("data").join("vectors")
}
