//! Hybrid retrieval index with rank fusion, reranking and persistence.
//!
//! Chunks are indexed twice, by dense embedding and by BM25, and queries
//! (plus optional expansions) are run against both. Rankings are merged with
//! weighted Reciprocal Rank Fusion, filtered on metadata, optionally reranked,
//! and returned with every intermediate score.
//!
//! # Main types
//!
//! - [`HybridIndex`] — Build, load, search and inspect the live index.
//! - [`SearchRequest`] / [`SearchHit`] — Search input and ranked output.
//! - [`ChunkStore`] — Positionally addressed chunk texts and metadata.
//! - [`FlatIpIndex`] — Exact inner-product vector index.
//! - [`Bm25Index`] — BM25 Okapi lexical index.
//! - [`EmbeddingProvider`] — Trait for computing text embeddings.
//! - [`RelevanceScorer`] — Trait for the secondary reranking pass.
//! - [`QueryExpander`] — Trait for expanding queries to improve recall.
//! - [`DocumentSource`] — Trait supplying chunks to a build.
//! - [`IndexFiles`] — On-disk layout of a persisted index.

/// BM25 Okapi lexical index.
pub mod bm25;
/// Positional chunk and metadata storage.
pub mod chunk_store;
/// Character-window text chunker.
pub mod chunking;
/// Embedding provider trait and local implementation.
pub mod embedding;
/// Hybrid index façade.
pub mod engine;
/// Golden-set retrieval evaluation.
pub mod evaluation;
/// Reciprocal rank fusion.
pub mod fusion;
/// Persisted index layout.
pub mod persistence;
/// Query expansion for improved recall.
pub mod query_expansion;
/// Secondary relevance scoring.
pub mod rerank;
/// Immutable index generations.
pub mod snapshot;
/// Document sources feeding a build.
pub mod source;
/// Exact inner-product vector index.
pub mod vector;

pub use bm25::{tokenize, Bm25Index};
pub use chunk_store::{ChunkId, ChunkStore, ChunkStoreBuilder};
pub use chunking::TextChunker;
pub use embedding::{EmbeddingProvider, LocalEmbedding};
pub use engine::{
    ChunkListing, HybridIndex, IndexOptions, SearchHit, SearchRequest, StoredChunk,
};
pub use evaluation::{evaluate, EvalCase, EvalReport};
pub use fusion::{resolve_retrieve_k, Candidate};
pub use persistence::IndexFiles;
pub use query_expansion::{QueryExpander, RuleBasedExpander};
pub use rerank::{EmbeddingSimilarityScorer, RelevanceScorer};
pub use snapshot::{IndexSnapshot, IndexStats};
pub use source::{DocumentSource, JsonlSource, SourceChunk, VecSource};
pub use vector::FlatIpIndex;
