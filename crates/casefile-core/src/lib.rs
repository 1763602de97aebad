//! Core types and error definitions for the Casefile retrieval index.
//!
//! This crate provides the foundational types shared across all Casefile crates,
//! including error handling, the chunk metadata model, metadata predicates and
//! index configuration.
//!
//! # Main types
//!
//! - [`CasefileError`] — Unified error enum for indexing, search and persistence.
//! - [`CasefileResult`] — Convenience alias for `Result<T, CasefileError>`.
//! - [`ChunkMetadata`] — Typed metadata attached to every stored chunk.
//! - [`SourceKind`] — Enumerated origin of a chunk.
//! - [`MetadataFilter`] — Serializable predicate applied during search.
//! - [`IndexConfig`] — TOML-backed index configuration.

/// Index configuration.
pub mod config;
/// Error type and result alias.
pub mod error;
/// Metadata predicates.
pub mod filter;
/// Chunk metadata model.
pub mod metadata;

pub use config::{Bm25Params, IndexConfig, RerankMode};
pub use error::{validate_dimension, CasefileError, CasefileResult};
pub use filter::MetadataFilter;
pub use metadata::{ChunkMetadata, SourceKind};
