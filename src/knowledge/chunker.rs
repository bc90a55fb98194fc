//! Content chunking for text processing
//!
//! Splits documents into overlapping, size-bounded chunks. Paragraphs are
//! accumulated up to the configured size; oversized paragraphs fall back to
//! sentence splitting, and oversized sentences to character windows.

use super::types::Chunk;
use crate::error::{RagError, Result};

/// Chunking parameters
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    /// Target maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters carried over between consecutive chunks
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl ChunkerConfig {
    /// Derive chunk parameters from a model token limit, using the
    /// 4-chars-per-token heuristic with a 10% safety margin.
    pub fn from_token_limit(token_limit: usize) -> Self {
        let chunk_size = (token_limit * 4 * 9 / 10).max(200);
        Self {
            chunk_size,
            overlap: chunk_size / 5,
        }
    }
}

/// Content chunker for splitting text into manageable pieces
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(RagError::InvalidConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        // An overlap at or above the chunk size would stall the window stride.
        let overlap = if config.overlap >= config.chunk_size {
            config.chunk_size / 4
        } else {
            config.overlap
        };
        Ok(Self {
            chunk_size: config.chunk_size,
            overlap,
        })
    }

    /// Split `content` into ordered chunks attributed to `source`.
    ///
    /// Every emitted chunk is trimmed, non-empty, and no longer than
    /// `chunk_size + overlap` characters.
    pub fn chunk(&self, content: &str, source: &str) -> Result<Vec<Chunk>> {
        let normalized = content.replace("\r\n", "\n");
        let mut acc = Accumulator::new(self.chunk_size, self.overlap);

        for paragraph in normalized.split("\n\n") {
            if paragraph.trim().is_empty() {
                continue;
            }
            if char_len(paragraph) > self.chunk_size {
                // Oversized paragraph: flush what we have, then feed its
                // sentences through the same accumulator.
                acc.flush();
                for sentence in split_sentences(paragraph) {
                    if char_len(&sentence) > self.chunk_size {
                        acc.flush();
                        acc.reset();
                        self.window_split(&sentence, &mut acc.out);
                    } else {
                        acc.push(&sentence, " ");
                    }
                }
            } else {
                acc.push(paragraph, "\n\n");
            }
        }
        acc.finish();

        let chunks = acc
            .out
            .into_iter()
            .map(|piece| piece.trim().to_string())
            .filter(|piece| !piece.is_empty())
            .enumerate()
            .map(|(index, content)| Chunk::new(source, index, content))
            .collect();
        Ok(chunks)
    }

    /// Character-window fallback for sentences that exceed the chunk size
    fn window_split(&self, text: &str, out: &mut Vec<String>) {
        let chars: Vec<char> = text.chars().collect();
        let stride = (self.chunk_size - self.overlap).max(1);
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            out.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += stride;
        }
    }
}

/// Size-bounded buffer that carries an overlap tail across flushes.
///
/// The tail seeded from the previous chunk never flushes on its own; a chunk
/// is emitted only once fresh content has been added after it.
struct Accumulator {
    chunk_size: usize,
    overlap: usize,
    pending: String,
    seed_len: usize,
    out: Vec<String>,
}

impl Accumulator {
    fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            pending: String::new(),
            seed_len: 0,
            out: Vec::new(),
        }
    }

    fn has_fresh(&self) -> bool {
        char_len(&self.pending) > self.seed_len
    }

    /// Add `unit`, flushing first when it would not fit
    fn push(&mut self, unit: &str, separator: &str) {
        if self.has_fresh()
            && char_len(&self.pending) + char_len(separator) + char_len(unit) > self.chunk_size
        {
            self.flush();
        }
        // Drop a lone seed the unit cannot share a chunk with
        if !self.pending.is_empty()
            && char_len(&self.pending) + char_len(separator) + char_len(unit) > self.chunk_size
        {
            self.reset();
        }
        if !self.pending.is_empty() {
            self.pending.push_str(separator);
        }
        self.pending.push_str(unit);
    }

    /// Emit the pending buffer and seed the next one with the overlap tail
    fn flush(&mut self) {
        if !self.has_fresh() || self.pending.trim().is_empty() {
            return;
        }
        let emitted = std::mem::take(&mut self.pending);
        if self.overlap > 0 {
            self.pending = tail_chars(&emitted, self.overlap).to_string();
            self.seed_len = char_len(&self.pending);
        }
        self.out.push(emitted);
    }

    /// Discard the buffer, including any carried seed
    fn reset(&mut self) {
        self.pending.clear();
        self.seed_len = 0;
    }

    /// Emit whatever fresh content remains
    fn finish(&mut self) {
        if self.has_fresh() && !self.pending.trim().is_empty() {
            self.out.push(std::mem::take(&mut self.pending));
        }
    }
}

/// Character count, as opposed to byte length
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `n` characters of `s`, on a char boundary
fn tail_chars(s: &str, n: usize) -> &str {
    let total = char_len(s);
    if total <= n {
        return s;
    }
    match s.char_indices().nth(total - n) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// Split text into sentences at `.`, `!`, `?` followed by whitespace or EOL,
/// keeping the terminator with the preceding sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            if let Some(next) = chars.peek() {
                if next.is_whitespace() {
                    sentences.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }
    sentences
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(chunk_size: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig {
            chunk_size,
            overlap,
        })
        .unwrap()
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunker(100, 20)
            .chunk("This is a short text.", "test.txt")
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "This is a short text.");
        assert_eq!(chunks[0].id, "test_txt_0");
    }

    #[test]
    fn test_paragraph_accumulation() {
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird paragraph here.";
        let chunks = chunker(50, 0).chunk(text, "doc").unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 50);
            assert_eq!(chunk.content.trim(), chunk.content);
        }
    }

    #[test]
    fn test_sentence_fallback() {
        let text = "One sentence here. Another sentence follows! A third one? Yes indeed.";
        let chunks = chunker(30, 5).chunk(text, "doc").unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 35);
        }
    }

    #[test]
    fn test_character_window_fallback() {
        // 10x the chunk size without a single sentence terminator
        let text = "x".repeat(200);
        let chunks = chunker(20, 4).chunk(&text, "doc").unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 24);
        }
        // Strided windows cover the whole input
        let stride = 16;
        let covered = (chunks.len() - 1) * stride + chunks.last().unwrap().content.chars().count();
        assert_eq!(covered, 200);
    }

    #[test]
    fn test_window_overlap_reconstruction() {
        let text: String = ('a'..='z').cycle().take(100).collect();
        let chunks = chunker(20, 4).chunk(&text, "doc").unwrap();
        // Dropping each chunk's leading overlap reconstructs the input
        let mut rebuilt = chunks[0].content.clone();
        for chunk in &chunks[1..] {
            rebuilt.push_str(&chunk.content.chars().skip(4).collect::<String>());
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_chunk_size_one() {
        let chunks = chunker(1, 0).chunk("abc", "doc").unwrap();
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert_eq!(chunk.content.chars().count(), 1);
        }
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let result = Chunker::new(ChunkerConfig {
            chunk_size: 0,
            overlap: 0,
        });
        assert!(matches!(result, Err(RagError::InvalidConfig(_))));
    }

    #[test]
    fn test_excessive_overlap_coerced() {
        // overlap >= chunk_size must not stall progress
        let chunks = chunker(10, 10).chunk(&"y".repeat(100), "doc").unwrap();
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 13);
        }
    }

    #[test]
    fn test_crlf_normalization() {
        let chunks = chunker(100, 0)
            .chunk("line one\r\n\r\nline two", "doc")
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].content.contains('\r'));
    }

    #[test]
    fn test_ids_are_sequential() {
        let text = "Para one.\n\nPara two.\n\nPara three.";
        let chunks = chunker(12, 0).chunk(text, "a/b.md").unwrap();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, format!("a_b_md_{}", i));
        }
    }

    #[test]
    fn test_seed_alone_never_emitted() {
        // Two paragraphs that each fill a chunk: the carried tail from the
        // first must not surface as its own chunk at EOF.
        let text = format!("{}\n\n{}", "a".repeat(40), "b".repeat(40));
        let chunks = chunker(50, 10).chunk(&text, "doc").unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "a".repeat(40));
        assert_eq!(chunks[1].content, "b".repeat(40));
    }

    #[test]
    fn test_from_token_limit() {
        let config = ChunkerConfig::from_token_limit(1000);
        assert_eq!(config.chunk_size, 3600);
        assert_eq!(config.overlap, 720);

        // Floors at 200 for tiny limits
        let small = ChunkerConfig::from_token_limit(10);
        assert_eq!(small.chunk_size, 200);
    }

    #[test]
    fn test_multibyte_content() {
        let text = "こんにちは世界、".repeat(30);
        let chunks = chunker(25, 5).chunk(&text, "doc").unwrap();
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 30);
        }
    }
}
