//! Recursive character chunking with overlap.
//!
//! Splitting is delegated to `text-splitter`, which descends through semantic
//! levels (line breaks, sentences, words, graphemes) until every chunk fits.
//! Whitespace is kept so consecutive chunks tile the page text, and each chunk
//! after the first may repeat up to `chunk_overlap` trailing characters.
//!
//! All sizes and offsets are in characters, not bytes.

use crate::types::{Chunk, Page};
use ragline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use text_splitter::{Characters, ChunkConfig as SplitterConfig, TextSplitter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A window of text and its character offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub start: usize,
    pub text: String,
}

pub struct RecursiveChunker {
    config: ChunkConfig,
    splitter: TextSplitter<Characters>,
}

impl RecursiveChunker {
    pub fn new(config: ChunkConfig) -> AppResult<Self> {
        config.validate()?;
        let splitter_config = SplitterConfig::new(config.chunk_size)
            .with_overlap(config.chunk_overlap)
            .map_err(|e| AppError::Config(format!("Invalid chunk overlap: {}", e)))?
            .with_trim(false);

        Ok(Self {
            config,
            splitter: TextSplitter::new(splitter_config),
        })
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    /// Split text into overlapping windows.
    pub fn split_text(&self, text: &str) -> Vec<TextSpan> {
        // Byte offsets come back in ascending order, so char offsets are
        // counted incrementally instead of rescanning from the start.
        let mut byte_cursor = 0;
        let mut char_cursor = 0;

        self.splitter
            .chunk_indices(text)
            .map(|(byte_offset, chunk)| {
                char_cursor += text[byte_cursor..byte_offset].chars().count();
                byte_cursor = byte_offset;
                TextSpan {
                    start: char_cursor,
                    text: chunk.to_string(),
                }
            })
            .collect()
    }

    /// Chunk one page; every chunk inherits the page metadata.
    pub fn chunk_page(&self, page: &Page) -> Vec<Chunk> {
        self.split_text(&page.text)
            .into_iter()
            .map(|span| Chunk {
                text: span.text,
                start_offset: span.start,
                metadata: page.metadata.clone(),
            })
            .collect()
    }

    pub fn chunk_pages<'a, I>(&self, pages: I) -> Vec<Chunk>
    where
        I: IntoIterator<Item = &'a Page>,
    {
        let chunks: Vec<Chunk> = pages
            .into_iter()
            .flat_map(|page| self.chunk_page(page))
            .collect();
        tracing::info!(
            "Created {} chunks (size={}, overlap={})",
            chunks.len(),
            self.config.chunk_size,
            self.config.chunk_overlap
        );
        chunks
    }
}

/// Rebuild the source text by dropping each window's overlap with its predecessor.
pub fn reconstruct(spans: &[TextSpan]) -> String {
    let mut text = String::new();
    let mut covered: usize = 0;
    for span in spans {
        let len = span.text.chars().count();
        text.extend(span.text.chars().skip(covered.saturating_sub(span.start)));
        covered = covered.max(span.start + len);
    }
    text
}
