//! Tokenization and fixed-size chunk splitting.
//!
//! Chunks are contiguous spans of the original text covering at most
//! `chunk_size` tokens each. For a document of `L` tokens and size `n`, the
//! non-overlapping strategy yields exactly `ceil(L / n)` chunks.

use std::ops::Range;
use std::sync::Arc;

use unicode_segmentation::UnicodeSegmentation;

use crate::types::RagError;

/// Maps text to token byte spans, in order.
pub trait Tokenizer: Send + Sync {
    /// Byte ranges of each token within `text`.
    fn token_spans(&self, text: &str) -> Vec<Range<usize>>;

    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> usize {
        self.token_spans(text).len()
    }
}

/// Default tokenizer: Unicode word boundaries, punctuation excluded.
///
/// Needs no model data; a "token" is any boundary segment containing at
/// least one alphanumeric character.
#[derive(Clone, Copy, Debug, Default)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn token_spans(&self, text: &str) -> Vec<Range<usize>> {
        text.split_word_bound_indices()
            .filter(|(_, segment)| segment.chars().any(char::is_alphanumeric))
            .map(|(start, segment)| start..start + segment.len())
            .collect()
    }
}

/// Byte-pair tokenizer over the `cl100k_base` vocabulary.
#[cfg(feature = "tokenizer-tiktoken")]
pub struct TiktokenTokenizer {
    bpe: tiktoken_rs::CoreBPE,
}

#[cfg(feature = "tokenizer-tiktoken")]
impl TiktokenTokenizer {
    pub fn cl100k() -> Result<Self, RagError> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|err| RagError::Configuration(err.to_string()))?;
        Ok(Self { bpe })
    }
}

#[cfg(feature = "tokenizer-tiktoken")]
impl Tokenizer for TiktokenTokenizer {
    fn token_spans(&self, text: &str) -> Vec<Range<usize>> {
        let Ok(pieces) = self.bpe.split_by_token(text, true) else {
            return Vec::new();
        };
        let mut spans = Vec::with_capacity(pieces.len());
        let mut offset = 0usize;
        for piece in pieces {
            let end = offset + piece.len();
            spans.push(offset..end);
            offset = end;
        }
        spans
    }
}

/// An ordered span of document text produced by the chunker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChunk {
    /// Zero-based position within the source document.
    pub index: usize,
    /// The text span, sliced from the original document.
    pub content: String,
    /// Token count of the span, always `<= chunk_size`.
    pub token_count: usize,
}

/// Splits text into ordered spans of at most `chunk_size` tokens.
#[derive(Clone)]
pub struct Chunker {
    tokenizer: Arc<dyn Tokenizer>,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            tokenizer: Arc::new(WordTokenizer),
            overlap: 0,
        }
    }
}

impl Chunker {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokenizer,
            overlap: 0,
        }
    }

    /// Number of tokens repeated between consecutive chunks.
    ///
    /// Must stay below the chunk size passed to [`split`](Self::split).
    #[must_use]
    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    /// Splits `text` into ordered chunks of at most `chunk_size` tokens.
    ///
    /// Empty or whitespace-only text yields zero chunks. A text shorter than
    /// `chunk_size` yields exactly one chunk.
    pub fn split(&self, text: &str, chunk_size: usize) -> Result<Vec<TextChunk>, RagError> {
        if chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.overlap >= chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk overlap {} must be smaller than chunk size {chunk_size}",
                self.overlap
            )));
        }

        let spans = self.tokenizer.token_spans(text);
        if spans.is_empty() {
            return Ok(Vec::new());
        }

        let step = chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0usize;
        while start < spans.len() {
            let end = usize::min(start + chunk_size, spans.len());
            let byte_start = spans[start].start;
            let byte_end = spans[end - 1].end;
            chunks.push(TextChunk {
                index: chunks.len(),
                content: text[byte_start..byte_end].to_string(),
                token_count: end - start,
            });
            if end == spans.len() {
                break;
            }
            start += step;
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(count: usize) -> String {
        (0..count)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn chunk_count_is_ceil_of_tokens_over_size() {
        let chunker = Chunker::default();
        for (tokens, size) in [(1, 512), (512, 512), (513, 512), (1000, 100), (7, 3)] {
            let chunks = chunker.split(&words(tokens), size).unwrap();
            assert_eq!(chunks.len(), tokens.div_ceil(size), "L={tokens} n={size}");
            assert!(chunks.iter().all(|chunk| chunk.token_count <= size));
        }
    }

    #[test]
    fn scenario_from_ingest_contract() {
        let chunker = Chunker::default();

        let one = chunker.split(&words(512), 512).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].token_count, 512);

        let three = chunker.split(&words(1025), 512).unwrap();
        assert_eq!(three.len(), 3);
        assert_eq!(three[0].token_count, 512);
        assert_eq!(three[1].token_count, 512);
        assert_eq!(three[2].token_count, 1);
    }

    #[test]
    fn short_document_yields_one_chunk() {
        let chunker = Chunker::default();
        let chunks = chunker.split("just a few words here", 512).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "just a few words here");
    }

    #[test]
    fn empty_document_yields_zero_chunks() {
        let chunker = Chunker::default();
        assert!(chunker.split("", 128).unwrap().is_empty());
        assert!(chunker.split("   \n\t ", 128).unwrap().is_empty());
    }

    #[test]
    fn chunks_are_ordered_and_non_overlapping() {
        let chunker = Chunker::default();
        let text = words(10);
        let chunks = chunker.split(&text, 4).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content, "w0 w1 w2 w3");
        assert_eq!(chunks[1].content, "w4 w5 w6 w7");
        assert_eq!(chunks[2].content, "w8 w9");
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn overlap_repeats_trailing_tokens() {
        let chunker = Chunker::default().with_overlap(1);
        let chunks = chunker.split(&words(5), 3).unwrap();
        assert_eq!(chunks[0].content, "w0 w1 w2");
        assert_eq!(chunks[1].content, "w2 w3 w4");
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let chunker = Chunker::default().with_overlap(4);
        let err = chunker.split("a b c", 4).unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let chunker = Chunker::default();
        let err = chunker.split("a b c", 0).unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }
}
