use std::collections::BTreeMap;

use casefile_core::{CasefileError, CasefileResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::bm25::Bm25Index;
use crate::chunk_store::ChunkStore;
use crate::vector::FlatIpIndex;

/// One complete, immutable generation of the index.
///
/// Searches hold an `Arc` to a snapshot for their whole duration, so a
/// rebuild never changes the data under an in-flight query.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    store: ChunkStore,
    vectors: FlatIpIndex,
    lexical: Option<Bm25Index>,
    generation: Uuid,
    built_at: DateTime<Utc>,
}

impl IndexSnapshot {
    /// Assemble a snapshot, checking that every part covers the same chunks.
    pub fn new(
        store: ChunkStore,
        vectors: FlatIpIndex,
        lexical: Option<Bm25Index>,
        generation: Uuid,
        built_at: DateTime<Utc>,
    ) -> CasefileResult<Self> {
        if vectors.len() != store.len() {
            return Err(CasefileError::InvalidState(format!(
                "vector count {} does not match chunk count {}",
                vectors.len(),
                store.len()
            )));
        }
        if let Some(lexical) = &lexical {
            if lexical.document_count() != store.len() {
                return Err(CasefileError::InvalidState(format!(
                    "lexical document count {} does not match chunk count {}",
                    lexical.document_count(),
                    store.len()
                )));
            }
        }
        Ok(Self {
            store,
            vectors,
            lexical,
            generation,
            built_at,
        })
    }

    /// Chunk texts and metadata.
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Dense vector index.
    pub fn vectors(&self) -> &FlatIpIndex {
        &self.vectors
    }

    /// Lexical index, when one was built.
    pub fn lexical(&self) -> Option<&Bm25Index> {
        self.lexical.as_ref()
    }

    /// Id shared by every persisted artifact of this snapshot.
    pub fn generation(&self) -> Uuid {
        self.generation
    }

    /// When the snapshot was built.
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Summary counters.
    pub fn stats(&self) -> IndexStats {
        let mut sources: BTreeMap<String, usize> = BTreeMap::new();
        let mut sections: Vec<&str> = Vec::new();
        for meta in self.store.metadata() {
            *sources.entry(meta.source.to_string()).or_insert(0) += 1;
            sections.push(meta.section.as_str());
        }
        sections.sort_unstable();
        sections.dedup();

        IndexStats {
            chunks: self.store.len(),
            dimension: self.vectors.dimension(),
            lexical_enabled: self.lexical.is_some(),
            generation: self.generation,
            built_at: self.built_at,
            sections: sections.len(),
            sources,
        }
    }
}

/// Summary of the live index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    /// Number of chunks.
    pub chunks: usize,
    /// Vector dimension.
    pub dimension: usize,
    /// Whether lexical scoring takes part in fusion.
    pub lexical_enabled: bool,
    /// Snapshot generation id.
    pub generation: Uuid,
    /// Build timestamp.
    pub built_at: DateTime<Utc>,
    /// Number of distinct section labels.
    pub sections: usize,
    /// Chunk count per source label.
    pub sources: BTreeMap<String, usize>,
}
