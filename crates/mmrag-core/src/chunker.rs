//! Word-window chunking.
//!
//! Text is split on whitespace and cut into windows of `chunk_size` words. Each
//! window starts `chunk_size - overlap` words after the previous one, so
//! neighbours share `overlap` words. The last window may be shorter.
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Chunk, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 500, overlap: 100 }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let config = Self { chunk_size, overlap };
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings whose window would never advance.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfiguration("chunk_size must be greater than zero".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfiguration(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Word offset ranges of every window over `word_count` words.
pub fn word_windows(word_count: usize, chunk_size: usize, overlap: usize) -> Result<Vec<Range<usize>>> {
    let config = ChunkingConfig::new(chunk_size, overlap)?;
    let mut windows = Vec::with_capacity(word_count.div_ceil(config.step()));
    let mut start = 0;
    while start < word_count {
        windows.push(start..(start + config.chunk_size).min(word_count));
        start += config.step();
    }
    Ok(windows)
}

/// Split `text` into overlapping windows of at most `chunk_size` words, each
/// re-joined with single spaces.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let windows = word_windows(words.len(), chunk_size, overlap)?;
    Ok(windows.into_iter().map(|w| words[w].join(" ")).collect())
}

/// Chunk a loaded document, tagging each piece with its ordinal and source.
pub fn chunk_document(doc: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let pieces = chunk_text(&doc.text, config.chunk_size, config.overlap)?;
    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| Chunk { text, chunk_index, source_file: doc.filename.clone() })
        .collect())
}
