//! Knowledge databases and the chunking that feeds them
//!
//! This module provides:
//! - Chunking of source documents into bounded, overlapping fragments
//! - The dense vector index (flat cosine scan, SQLite persistence)
//! - The knowledge graph store (lexical token-overlap retrieval)

pub mod chunker;
pub mod graph_store;
pub mod types;
pub mod vector_index;

pub use chunker::{Chunker, ChunkerConfig};
pub use graph_store::{graph_dir, GraphStore, LexicalGraphStore};
pub use types::*;
pub use vector_index::{vectors_dir, FlatVectorIndex, ScoredRecord, VectorIndex};
