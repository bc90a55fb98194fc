//! Type definitions for the knowledge databases

use serde::{Deserialize, Serialize};

/// A source document handed to the builder by the readers
#[derive(Debug, Clone)]
pub struct Document {
    /// Display name, usually the path relative to `data/`
    pub name: String,
    /// Full UTF-8 content
    pub content: String,
}

impl Document {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// A bounded, trimmed text fragment cut from a source document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Stable identifier: `sanitize(source) + "_" + index`
    pub id: String,
    pub content: String,
    /// Name of the originating document
    pub source: String,
    /// Position within the source, 0-based
    pub index: usize,
}

impl Chunk {
    pub fn new(source: &str, index: usize, content: String) -> Self {
        Self {
            id: format!("{}_{}", sanitize_source(source), index),
            content,
            source: source.to_string(),
            index,
        }
    }
}

/// Replace path separators, dots, and spaces so chunk ids stay flat
pub fn sanitize_source(source: &str) -> String {
    source
        .chars()
        .map(|c| match c {
            '/' | '\\' | '.' | ' ' => '_',
            other => other,
        })
        .collect()
}

/// Metadata stored alongside each vector record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordMetadata {
    pub source: String,
    pub index: usize,
}

/// An embedded chunk as stored in the vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub content: String,
    pub metadata: RecordMetadata,
    pub embedding: Vec<f32>,
}

impl VectorRecord {
    pub fn from_chunk(chunk: &Chunk, embedding: Vec<f32>) -> Self {
        Self {
            id: chunk.id.clone(),
            content: chunk.content.clone(),
            metadata: RecordMetadata {
                source: chunk.source.clone(),
                index: chunk.index,
            },
            embedding,
        }
    }
}

/// A subject-predicate-object fact extracted from text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    /// Build a triple from raw strings, trimming each field.
    /// Returns `None` when any field trims down to empty.
    pub fn new(subject: &str, predicate: &str, object: &str) -> Option<Self> {
        let subject = subject.trim();
        let predicate = predicate.trim();
        let object = object.trim();
        if subject.is_empty() || predicate.is_empty() || object.is_empty() {
            return None;
        }
        Some(Self {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.to_string(),
        })
    }

    /// All three fields joined with spaces, used by lexical scoring
    pub fn joined(&self) -> String {
        format!("{} {} {}", self.subject, self.predicate, self.object)
    }
}

impl std::fmt::Display for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_source() {
        assert_eq!(sanitize_source("data/notes v2.md"), "data_notes_v2_md");
        assert_eq!(sanitize_source("a\\b.txt"), "a_b_txt");
    }

    #[test]
    fn test_chunk_id() {
        let chunk = Chunk::new("docs/intro.md", 3, "text".to_string());
        assert_eq!(chunk.id, "docs_intro_md_3");
        assert_eq!(chunk.index, 3);
    }

    #[test]
    fn test_triple_rejects_empty_fields() {
        assert!(Triple::new("AI", "is", "  ").is_none());
        assert!(Triple::new(" ", "is", "x").is_none());

        let triple = Triple::new(" AI ", "is", "useful").unwrap();
        assert_eq!(triple.subject, "AI");
        assert_eq!(triple.to_string(), "AI is useful");
    }
}
