use std::sync::LazyLock;

use casefile_core::{CasefileError, CasefileResult, ChunkMetadata};
use regex::Regex;

use crate::source::SourceChunk;

static MPEP_REF: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"MPEP\s*§?\s*\d+").ok());
static USC_REF: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"35 U\.?S\.?C\.?\s*§?\s*\d+").ok());
static CFR_REF: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"37 C\.?F\.?R\.?\s*§?\s*\d+").ok());

fn found(pattern: &LazyLock<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

/// Splits raw document text into overlapping, section-labelled chunks.
///
/// Windows are measured in characters, not bytes. Each kept window is
/// prefixed with `[<section>] ` and tagged with cross-reference flags
/// (`has_mpep_ref`, `has_usc_ref`, `has_cfr_ref`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
    min_chunk_length: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 100,
            min_chunk_length: 50,
        }
    }
}

impl TextChunker {
    /// Custom window geometry. `overlap` must be smaller than `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize, min_chunk_length: usize) -> CasefileResult<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(CasefileError::Config(format!(
                "chunk overlap {overlap} must be smaller than chunk size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
            min_chunk_length,
        })
    }

    /// Chunk `text`, copying `base` into every chunk's metadata.
    ///
    /// Windows whose trimmed length is below the minimum are dropped.
    pub fn chunk(&self, text: &str, base: &ChunkMetadata) -> Vec<SourceChunk> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size - self.overlap;
        let mut out = Vec::new();

        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            start += step;

            if window.trim().chars().count() < self.min_chunk_length {
                continue;
            }

            let metadata = base
                .clone()
                .with_field("has_mpep_ref", found(&MPEP_REF, &window))
                .with_field("has_usc_ref", found(&USC_REF, &window))
                .with_field("has_cfr_ref", found(&CFR_REF, &window));

            out.push(SourceChunk {
                text: format!("[{}] {window}", base.section),
                metadata,
            });
        }
        out
    }
}
