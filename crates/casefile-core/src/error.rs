use thiserror::Error;

/// A convenience `Result` alias using [`CasefileError`].
pub type CasefileResult<T> = Result<T, CasefileError>;

/// Top-level error type for the Casefile retrieval index.
///
/// Each variant corresponds to one failure kind a caller can act on:
/// rebuild on [`CasefileError::CorruptIndex`], build or load first on
/// [`CasefileError::NotBuilt`], and so on.
#[derive(Error, Debug)]
pub enum CasefileError {
    /// A search was issued before any build or load succeeded.
    #[error("Index not built: run build or load first")]
    NotBuilt,

    /// The document source produced no chunks.
    #[error("Empty corpus: no chunks were produced, nothing was indexed")]
    EmptyCorpus,

    /// Persisted artifacts exist but are inconsistent or unreadable.
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// The embedding provider or relevance scorer failed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The query expander failed. Recovered inside search.
    #[error("Expansion error: {0}")]
    Expansion(String),

    /// An operation was called in the wrong lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An embedding had the wrong number of components.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index was built with.
        expected: usize,
        /// Dimension that was supplied.
        actual: usize,
    },

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CasefileError {
    /// Returns `true` when the error means the persisted index must be rebuilt.
    pub fn requires_rebuild(&self) -> bool {
        matches!(self, CasefileError::CorruptIndex(_))
    }
}

/// Validates that an embedding has the expected dimension.
pub fn validate_dimension(expected: usize, actual: usize) -> CasefileResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(CasefileError::DimensionMismatch { expected, actual })
    }
}
