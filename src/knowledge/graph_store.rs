//! Knowledge graph store: subject-predicate-object facts with lexical retrieval
//!
//! The graph is not a semantic engine. Retrieval scores each fact by the
//! number of distinct query tokens appearing case-insensitively in its
//! concatenated fields, which keeps results explainable and the
//! implementation dependency-free. Do not swap in a smarter scheme; the
//! ordering is part of the contract.

use crate::error::{ErrorContext, RagError, Result};
use crate::knowledge::types::Triple;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqlitePool, Row};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Database file name inside the graph directory
const DB_FILE: &str = "graph.db";

/// Minimum token length considered by the scorer
const MIN_TOKEN_LEN: usize = 3;

/// Contract for the graph side of retrieval
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Insert facts in order, dropping exact duplicates
    fn add_many(&mut self, triples: Vec<Triple>) -> Result<()>;

    /// Facts with positive token-overlap score, descending, capped at `k`
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Triple>>;

    /// Number of stored facts
    fn count(&self) -> usize;

    /// Flush the store to disk
    async fn persist(&self) -> Result<()>;
}

/// In-memory triple set with SQLite persistence
pub struct LexicalGraphStore {
    dir: PathBuf,
    triples: Vec<Triple>,
    /// Lowercased `subject predicate object` per triple, kept in step
    lowered: Vec<String>,
    seen: HashSet<Triple>,
}

impl LexicalGraphStore {
    /// Create an empty store rooted at `dir` (usually `data/graph/`)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            triples: Vec::new(),
            lowered: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Load a previously persisted store from `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::new(dir);
        let path = store.dir.join(DB_FILE);
        if !path.exists() {
            return Err(RagError::NotFound(format!(
                "graph store not found at {}",
                path.display()
            )));
        }

        let pool = SqlitePool::connect(&format!("sqlite:{}", path.display()))
            .await
            .with_context("open graph store")?;

        let rows = sqlx::query("SELECT subject, predicate, object FROM triples ORDER BY rowid")
            .fetch_all(&pool)
            .await
            .with_context("load graph triples")?;
        pool.close().await;

        let mut triples = Vec::with_capacity(rows.len());
        for row in rows {
            let subject: String = row.get("subject");
            let predicate: String = row.get("predicate");
            let object: String = row.get("object");
            if let Some(triple) = Triple::new(&subject, &predicate, &object) {
                triples.push(triple);
            }
        }
        store.add_many(triples)?;

        info!(count = store.count(), "Opened graph store");
        Ok(store)
    }
}

#[async_trait]
impl GraphStore for LexicalGraphStore {
    fn add_many(&mut self, triples: Vec<Triple>) -> Result<()> {
        for triple in triples {
            if triple.subject.is_empty() || triple.predicate.is_empty() || triple.object.is_empty()
            {
                return Err(RagError::InvalidInput(
                    "triple with empty field".to_string(),
                ));
            }
            if self.seen.insert(triple.clone()) {
                self.lowered.push(triple.joined().to_lowercase());
                self.triples.push(triple);
            }
        }
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<Triple>> {
        let tokens = query_tokens(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, &Triple)> = self
            .triples
            .iter()
            .zip(self.lowered.iter())
            .filter_map(|(triple, haystack)| {
                let score = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
                (score > 0).then_some((score, triple))
            })
            .collect();

        // Stable sort keeps insertion order between equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(k);

        debug!(hits = scored.len(), "Graph search complete");
        Ok(scored.into_iter().map(|(_, t)| t.clone()).collect())
    }

    fn count(&self) -> usize {
        self.triples.len()
    }

    async fn persist(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).with_context("create graph directory")?;
        let path = self.dir.join(DB_FILE);
        let tmp = self.dir.join(format!("{}.tmp", DB_FILE));
        if tmp.exists() {
            std::fs::remove_file(&tmp).with_context("clear stale graph temp file")?;
        }

        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", tmp.display()))
            .await
            .with_context("create graph store")?;

        sqlx::query(
            r#"
            CREATE TABLE store_info (
                triple_count INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .with_context("create graph manifest table")?;

        sqlx::query(
            r#"
            CREATE TABLE triples (
                subject TEXT NOT NULL,
                predicate TEXT NOT NULL,
                object TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .with_context("create graph triples table")?;

        let mut tx = pool.begin().await.with_context("begin graph flush")?;

        sqlx::query("INSERT INTO store_info (triple_count, created_at) VALUES (?1, ?2)")
            .bind(self.triples.len() as i64)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .with_context("write graph manifest")?;

        for triple in &self.triples {
            sqlx::query("INSERT INTO triples (subject, predicate, object) VALUES (?1, ?2, ?3)")
                .bind(&triple.subject)
                .bind(&triple.predicate)
                .bind(&triple.object)
                .execute(&mut *tx)
                .await
                .with_context("write graph triple")?;
        }

        tx.commit().await.with_context("commit graph flush")?;
        pool.close().await;

        std::fs::rename(&tmp, &path).with_context("swap graph store into place")?;
        info!(count = self.triples.len(), path = %path.display(), "Persisted graph store");
        Ok(())
    }
}

/// Lowercased, deduplicated query tokens of length >= 3
fn query_tokens(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .split_ascii_whitespace()
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Directory used by the builder and runtime for graph artifacts
pub fn graph_dir(project_dir: &Path) -> PathBuf {
    project_dir.join("data").join("graph")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(s, p, o).unwrap()
    }

    #[test]
    fn test_dedup_on_insert() {
        let mut store = LexicalGraphStore::new("unused");
        store
            .add_many(vec![
                triple("AI", "is", "useful"),
                triple("AI", "is", "useful"),
                triple("AI", "is", "powerful"),
            ])
            .unwrap();
        assert_eq!(store.count(), 2);
    }

    #[tokio::test]
    async fn test_search_scores_by_token_overlap() {
        let mut store = LexicalGraphStore::new("unused");
        store
            .add_many(vec![
                triple("Rust", "has", "ownership"),
                triple("Rust", "compiles to", "machine code"),
                triple("Python", "has", "garbage collection"),
            ])
            .unwrap();

        let hits = store.search("rust machine code", 10).await.unwrap();
        assert_eq!(hits[0], triple("Rust", "compiles to", "machine code"));
        // Single-token match ranks below the triple-token match
        assert_eq!(hits[1], triple("Rust", "has", "ownership"));
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let mut store = LexicalGraphStore::new("unused");
        store
            .add_many(vec![triple("Tokio", "powers", "async Rust")])
            .unwrap();

        assert_eq!(store.search("TOKIO", 5).await.unwrap().len(), 1);
        assert_eq!(store.search("tokio", 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_short_tokens_ignored() {
        let mut store = LexicalGraphStore::new("unused");
        store.add_many(vec![triple("AI", "is", "new")]).unwrap();

        // Every query token is shorter than three characters
        assert!(store.search("ai is", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_alphanumeric_query() {
        let mut store = LexicalGraphStore::new("unused");
        store
            .add_many(vec![triple("graph", "stores", "facts")])
            .unwrap();
        assert!(store.search("?! @#", 5).await.unwrap().is_empty());
        assert!(store.search("", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tie_break_is_insertion_order() {
        let mut store = LexicalGraphStore::new("unused");
        store
            .add_many(vec![
                triple("kernel", "schedules", "threads"),
                triple("kernel", "manages", "memory"),
            ])
            .unwrap();

        let hits = store.search("kernel", 10).await.unwrap();
        assert_eq!(hits[0], triple("kernel", "schedules", "threads"));
        assert_eq!(hits[1], triple("kernel", "manages", "memory"));
    }

    #[tokio::test]
    async fn test_truncates_to_k() {
        let mut store = LexicalGraphStore::new("unused");
        let triples: Vec<Triple> = (0..20)
            .map(|i| triple("node", "links", &format!("target{}", i)))
            .collect();
        store.add_many(triples).unwrap();

        assert_eq!(store.search("node", 5).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_persist_and_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = LexicalGraphStore::new(dir.path());
        store
            .add_many(vec![
                triple("AI", "is", "simulation of intelligence"),
                triple("chunks", "feed", "embeddings"),
            ])
            .unwrap();
        store.persist().await.unwrap();

        let reopened = LexicalGraphStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.count(), 2);
        let hits = reopened.search("simulation", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].subject, "AI");
    }

    #[tokio::test]
    async fn test_open_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        let result = LexicalGraphStore::open(dir.path()).await;
        assert!(matches!(result, Err(RagError::NotFound(_))));
    }
}
