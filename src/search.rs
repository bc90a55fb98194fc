//! Hybrid retrieval: dense vector search and graph lookup in parallel
//!
//! The vector side is authoritative; its failure is the caller's failure.
//! The graph side is a lexical overlay and degrades to nothing on error or
//! timeout. An optional reranker reorders vector hits; its scores replace
//! the cosine similarity without renormalization.

use crate::embedder::EmbeddingClient;
use crate::error::{RagError, Result};
use crate::knowledge::{GraphStore, Triple, VectorIndex};
use crate::reranker::RerankClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of vector hits in a context block
pub const DEFAULT_VECTOR_K: usize = 5;
/// Default number of graph facts in a context block
pub const DEFAULT_GRAPH_K: usize = 10;
/// Soft deadline for the graph side of retrieval
pub const GRAPH_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request retrieval knobs
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub vector_k: usize,
    pub graph_k: usize,
    /// How many reranked hits to keep; defaults to all vector hits
    pub rerank_top: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            vector_k: DEFAULT_VECTOR_K,
            graph_k: DEFAULT_GRAPH_K,
            rerank_top: None,
        }
    }
}

impl SearchOptions {
    /// Options with both sides capped at `k`
    pub fn with_top_k(k: usize) -> Self {
        Self {
            vector_k: k,
            graph_k: k,
            rerank_top: None,
        }
    }
}

/// One vector hit as presented to the model
#[derive(Debug, Clone, serde::Serialize)]
pub struct VectorHit {
    pub id: String,
    pub source: String,
    pub similarity: f32,
    pub content: String,
}

/// Structured output of one retrieval
#[derive(Debug, Clone, Default)]
pub struct RetrievalContext {
    pub vector_hits: Vec<VectorHit>,
    pub graph_facts: Vec<Triple>,
}

impl RetrievalContext {
    pub fn is_empty(&self) -> bool {
        self.vector_hits.is_empty() && self.graph_facts.is_empty()
    }

    /// Render the context block handed to the LLM. Empty sections are
    /// omitted entirely.
    pub fn format_block(&self) -> String {
        let mut sections = Vec::new();

        if !self.vector_hits.is_empty() {
            let mut section = String::from("## Relevant Knowledge\n");
            for (i, hit) in self.vector_hits.iter().enumerate() {
                section.push_str(&format!(
                    "\n**[{}] Source: {}** (similarity: {:.4})\n{}\n",
                    i + 1,
                    hit.source,
                    hit.similarity,
                    hit.content
                ));
            }
            sections.push(section);
        }

        if !self.graph_facts.is_empty() {
            let mut section = String::from("## Knowledge Graph Context\n\nKnowledge Graph Facts:\n");
            for fact in &self.graph_facts {
                section.push_str(&format!("- {}\n", fact));
            }
            sections.push(section);
        }

        sections.join("\n")
    }
}

/// Retrieval engine shared by every protocol facade
pub struct HybridSearchEngine {
    vectors: Arc<dyn VectorIndex>,
    graph: Arc<dyn GraphStore>,
    embedder: Arc<EmbeddingClient>,
    reranker: Option<Arc<RerankClient>>,
    graph_timeout: Duration,
}

impl HybridSearchEngine {
    pub fn new(
        vectors: Arc<dyn VectorIndex>,
        graph: Arc<dyn GraphStore>,
        embedder: Arc<EmbeddingClient>,
        reranker: Option<Arc<RerankClient>>,
    ) -> Self {
        Self {
            vectors,
            graph,
            embedder,
            reranker,
            graph_timeout: GRAPH_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_graph_timeout(mut self, timeout: Duration) -> Self {
        self.graph_timeout = timeout;
        self
    }

    pub fn vector_count(&self) -> usize {
        self.vectors.count()
    }

    pub fn graph_count(&self) -> usize {
        self.graph.count()
    }

    /// Run vector and graph retrieval concurrently and assemble a context
    pub async fn retrieve(&self, query: &str, options: &SearchOptions) -> Result<RetrievalContext> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidInput("empty retrieval query".to_string()));
        }

        let vector_side = self.vector_search(query, options.vector_k);
        let graph_side =
            tokio::time::timeout(self.graph_timeout, self.graph.search(query, options.graph_k));

        let (vector_result, graph_result) = tokio::join!(vector_side, graph_side);

        let mut vector_hits = vector_result?;
        let graph_facts = match graph_result {
            Ok(Ok(facts)) => facts,
            Ok(Err(e)) => {
                warn!("Graph search failed, continuing without facts: {}", e);
                Vec::new()
            }
            Err(_) => {
                warn!("Graph search timed out, continuing without facts");
                Vec::new()
            }
        };

        if let Some(reranker) = &self.reranker {
            if vector_hits.len() >= 2 {
                vector_hits = self
                    .rerank_hits(reranker, query, vector_hits, options.rerank_top)
                    .await;
            }
        }

        debug!(
            vector_hits = vector_hits.len(),
            graph_facts = graph_facts.len(),
            "Retrieval complete"
        );
        Ok(RetrievalContext {
            vector_hits,
            graph_facts,
        })
    }

    /// Embed the query and run the vector index; any failure on this path
    /// surfaces as a retrieval failure.
    async fn vector_search(&self, query: &str, k: usize) -> Result<Vec<VectorHit>> {
        let embedding = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| RagError::Retrieval(format!("embed query: {}", e)))?;

        let scored = self
            .vectors
            .query(&embedding, k)
            .await
            .map_err(|e| RagError::Retrieval(format!("vector query: {}", e)))?;

        Ok(scored
            .into_iter()
            .map(|s| VectorHit {
                id: s.record.id,
                source: s.record.metadata.source,
                similarity: s.similarity,
                content: s.record.content,
            })
            .collect())
    }

    /// Reorder hits by rerank relevance. Failure keeps the cosine order.
    async fn rerank_hits(
        &self,
        reranker: &RerankClient,
        query: &str,
        hits: Vec<VectorHit>,
        rerank_top: Option<usize>,
    ) -> Vec<VectorHit> {
        let documents: Vec<String> = hits.iter().map(|h| h.content.clone()).collect();
        let top_n = rerank_top.unwrap_or(hits.len()).min(hits.len());

        match reranker.rerank(query, &documents, top_n).await {
            Ok(mut results) => {
                results.sort_by(|a, b| {
                    b.relevance_score
                        .partial_cmp(&a.relevance_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                results
                    .into_iter()
                    .map(|r| {
                        let mut hit = hits[r.index].clone();
                        hit.similarity = r.relevance_score;
                        hit
                    })
                    .collect()
            }
            Err(e) => {
                warn!("Rerank failed, keeping cosine order: {}", e);
                hits
            }
        }
    }
}
