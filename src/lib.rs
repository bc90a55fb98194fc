//! ragforge: a GraphRAG knowledge compiler and agent runtime
//!
//! Two phases share this crate:
//! - The builder ingests a directory of documents and emits a dense vector
//!   index plus a knowledge graph of subject-predicate-object facts.
//! - The runtime loads those databases and serves hybrid retrieval-augmented
//!   chat behind three protocol facades on one port: an OpenAI-compatible
//!   REST endpoint, MCP, and A2A.
//!
//! # Example
//!
//! ```rust,no_run
//! use ragforge::context::AppContext;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = AppContext::load(Path::new("my-agent"), None)?;
//!     let report = ragforge::builder::build(&ctx).await?;
//!     println!("indexed {} chunks, {} facts", report.vectors, report.triples);
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod context;
pub mod embedder;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod manifest;
pub mod readers;
pub mod reranker;
pub mod scaffold;
pub mod search;
pub mod server;

// Re-export main types
pub use builder::{build, BuildReport};
pub use config::{EmbedderConfig, LlmConfig, RerankerConfig, RuntimeConfig};
pub use context::AppContext;
pub use embedder::EmbeddingClient;
pub use error::{RagError, Result};
pub use knowledge::{
    Chunk, Chunker, ChunkerConfig, Document, FlatVectorIndex, GraphStore, LexicalGraphStore,
    ScoredRecord, Triple, VectorIndex, VectorRecord,
};
pub use llm::{LlmClient, Message, Role};
pub use manifest::{AgentManifest, EmbeddingMode, McpToolSpec};
pub use reranker::RerankClient;
pub use search::{HybridSearchEngine, RetrievalContext, SearchOptions, VectorHit};
pub use server::{build_router, serve, AppState};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
