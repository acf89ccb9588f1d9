//! Token-window document chunker.
//!
//! Splits text into 500-token windows (cl100k_base) with 10% overlap,
//! preferring to end non-final chunks at sentence punctuation found in the
//! last 20% of the decoded window.

use thiserror::Error;
use tiktoken_rs::CoreBPE;

use crate::config::ChunkingConfig;

/// Sentence endings considered valid chunk boundaries.
const SENTENCE_ENDINGS: &[&str] = &[". ", "! ", "? ", ".\n", "!\n", "?\n"];

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("invalid chunking config: {0}")]
    Config(String),

    #[error("tokenizer initialization failed: {0}")]
    Tokenizer(String),

    #[error("token decode failed: {0}")]
    Decode(String),
}

pub struct Chunker {
    bpe: CoreBPE,
    chunk_size: usize,
    overlap: usize,
}

// Manual impl because CoreBPE does not implement Debug
impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("chunk_size", &self.chunk_size)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Result<Self, ChunkError> {
        if config.chunk_size == 0 {
            return Err(ChunkError::Config("chunk_size must be positive".to_string()));
        }
        let overlap = config.chunk_size * config.overlap_percent / 100;
        // An overlap at or above the window would keep the window from advancing
        if overlap >= config.chunk_size {
            return Err(ChunkError::Config(format!(
                "overlap_percent {} must leave the window room to advance",
                config.overlap_percent
            )));
        }

        let bpe = tiktoken_rs::cl100k_base().map_err(|e| ChunkError::Tokenizer(e.to_string()))?;
        Ok(Self {
            bpe,
            chunk_size: config.chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Count tokens in a text under the chunker's encoding.
    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Split a document into token-bounded chunks.
    ///
    /// Documents at or below the window size come back as a single chunk equal
    /// to the input. Larger documents produce overlapping windows; each
    /// non-final window is trimmed back to a sentence boundary when one exists
    /// in its last 20%.
    pub fn chunk_document(&self, document: &str) -> Result<Vec<String>, ChunkError> {
        let tokens = self.bpe.encode_ordinary(document);
        let total_tokens = tokens.len();

        tracing::debug!(
            chars = document.len(),
            tokens = total_tokens,
            "Chunking document"
        );

        if total_tokens <= self.chunk_size {
            return Ok(vec![document.to_string()]);
        }

        let mut chunks = Vec::new();
        let mut start_idx = 0usize;

        while start_idx < total_tokens {
            let end_idx = usize::min(start_idx + self.chunk_size, total_tokens);

            let chunk_tokens = tokens[start_idx..end_idx].to_vec();
            let mut chunk_text = self
                .bpe
                .decode(chunk_tokens)
                .map_err(|e| ChunkError::Decode(e.to_string()))?;

            if end_idx < total_tokens {
                chunk_text = break_at_sentence_boundary(&chunk_text);
            }

            chunks.push(chunk_text.trim().to_string());

            if end_idx >= total_tokens {
                break;
            }

            start_idx = end_idx - self.overlap;
        }

        tracing::debug!(chunks = chunks.len(), "Created chunks");
        Ok(chunks)
    }
}

/// Trim text back to the last sentence ending found in its final 20%.
/// Returns the input unchanged when no ending is found.
fn break_at_sentence_boundary(text: &str) -> String {
    let mut break_point = (text.len() as f64 * 0.8) as usize;
    while break_point > 0 && !text.is_char_boundary(break_point) {
        break_point -= 1;
    }
    let search_text = &text[break_point..];

    let mut last_ending: Option<usize> = None;
    for ending in SENTENCE_ENDINGS {
        if let Some(pos) = search_text.rfind(ending) {
            if last_ending.map_or(true, |prev| pos > prev) {
                last_ending = Some(pos);
            }
        }
    }

    match last_ending {
        // pos + 1 keeps the punctuation, drops the trailing space/newline
        Some(pos) if pos > 0 => text[..break_point + pos + 1].trim().to_string(),
        _ => text.to_string(),
    }
}
