use std::path::PathBuf;

use async_trait::async_trait;
use casefile_core::{CasefileError, CasefileResult, ChunkMetadata, SourceKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chunking::TextChunker;

/// One contextualised chunk ready to be indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceChunk {
    /// Chunk text, already prefixed with its section label.
    pub text: String,
    /// Metadata stored alongside the chunk.
    pub metadata: ChunkMetadata,
}

impl SourceChunk {
    /// Pair a text with its metadata.
    pub fn new(text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// Produces the full set of chunks for a build.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Every chunk, in the order they should be assigned ids.
    async fn chunks(&self) -> CasefileResult<Vec<SourceChunk>>;
}

/// In-memory source, mostly for tests and embedding callers.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    chunks: Vec<SourceChunk>,
}

impl VecSource {
    /// Wrap a prepared list of chunks.
    pub fn new(chunks: Vec<SourceChunk>) -> Self {
        Self { chunks }
    }
}

#[async_trait]
impl DocumentSource for VecSource {
    async fn chunks(&self) -> CasefileResult<Vec<SourceChunk>> {
        Ok(self.chunks.clone())
    }
}

/// A raw document line that still needs chunking.
#[derive(Debug, Deserialize)]
struct RawDocument {
    document: String,
    section: String,
    #[serde(default = "default_source")]
    source: SourceKind,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

fn default_source() -> SourceKind {
    SourceKind::Mpep
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonlRecord {
    Chunk(SourceChunk),
    Document(RawDocument),
}

/// Newline-delimited JSON corpus.
///
/// Each non-blank line is either a ready chunk
/// `{"text": "...", "metadata": {...}}` or a raw document
/// `{"document": "...", "section": "...", "source": "...", ...}`, which is
/// split with the configured [`TextChunker`]. Extra fields on a raw document
/// are copied into every chunk's metadata.
#[derive(Debug, Clone)]
pub struct JsonlSource {
    path: PathBuf,
    chunker: TextChunker,
}

impl JsonlSource {
    /// Read from `path` with the default chunker.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunker: TextChunker::default(),
        }
    }

    /// Use a custom chunker for raw documents.
    pub fn with_chunker(mut self, chunker: TextChunker) -> Self {
        self.chunker = chunker;
        self
    }

    /// Parse an in-memory JSONL document.
    pub fn parse(&self, raw: &str) -> CasefileResult<Vec<SourceChunk>> {
        let mut chunks = Vec::new();
        let mut documents = 0usize;

        for (lineno, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: JsonlRecord = serde_json::from_str(line).map_err(|e| {
                CasefileError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("{}:{}: {e}", self.path.display(), lineno + 1),
                ))
            })?;
            match record {
                JsonlRecord::Chunk(chunk) => chunks.push(chunk),
                JsonlRecord::Document(doc) => {
                    documents += 1;
                    let mut base = ChunkMetadata::new(doc.source, doc.section).with_source_flags();
                    base.extra = doc.extra;
                    let pieces = self.chunker.chunk(&doc.document, &base);
                    debug!(section = %base.section, chunks = pieces.len(), "Chunked document");
                    chunks.extend(pieces);
                }
            }
        }

        info!(
            path = %self.path.display(),
            documents,
            chunks = chunks.len(),
            "Read JSONL corpus"
        );
        Ok(chunks)
    }
}

#[async_trait]
impl DocumentSource for JsonlSource {
    async fn chunks(&self) -> CasefileResult<Vec<SourceChunk>> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        self.parse(&raw)
    }
}
