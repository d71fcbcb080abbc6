//! Overlapping window text splitter
//!
//! Windows are measured in [`ChunkUnit`]s and every chunk is an exact slice
//! of the input, so chunks produced with zero overlap concatenate back to
//! the original text. The output order defines each chunk's index.

use serde::{Deserialize, Serialize};

use crate::errors::{RagError, Result};

/// Unit in which chunk size and overlap are measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkUnit {
    /// Unicode scalar values
    Characters,
    /// A run of non-whitespace plus the whitespace that follows it
    #[default]
    Words,
}

/// Splits text into overlapping windows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    unit: ChunkUnit,
}

impl TextSplitter {
    /// Create a splitter, rejecting invalid size/overlap pairs up front
    pub fn new(chunk_size: usize, chunk_overlap: usize, unit: ChunkUnit) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::ChunkingConfiguration {
                chunk_size,
                chunk_overlap,
                reason: "chunk size must be greater than 0".to_string(),
            });
        }

        if chunk_overlap >= chunk_size {
            return Err(RagError::ChunkingConfiguration {
                chunk_size,
                chunk_overlap,
                reason: "chunk overlap must be smaller than chunk size".to_string(),
            });
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            unit,
        })
    }

    /// Split `text` into ordered, overlapping chunks
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let bounds = unit_bounds(text, self.unit);
        let units = bounds.len() - 1;
        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::with_capacity(units / step + 1);

        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(units);
            chunks.push(text[bounds[start]..bounds[end]].to_string());
            if end == units {
                break;
            }
            start += step;
        }

        chunks
    }

    /// Configured window size in units
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Configured overlap in units
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Configured unit
    pub fn unit(&self) -> ChunkUnit {
        self.unit
    }
}

/// Byte offset of every unit start, followed by the end of the text
fn unit_bounds(text: &str, unit: ChunkUnit) -> Vec<usize> {
    let mut bounds = match unit {
        ChunkUnit::Characters => text.char_indices().map(|(i, _)| i).collect::<Vec<_>>(),
        ChunkUnit::Words => word_starts(text),
    };
    bounds.push(text.len());
    bounds
}

/// Byte offsets where words begin; the first word always starts at 0 so
/// leading whitespace is never dropped
fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    let mut seen_word = false;
    let mut prev_whitespace = false;

    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            prev_whitespace = true;
            continue;
        }
        if seen_word && prev_whitespace {
            starts.push(i);
        }
        seen_word = true;
        prev_whitespace = false;
    }

    starts
}
