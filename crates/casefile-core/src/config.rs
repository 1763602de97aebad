use crate::error::{CasefileError, CasefileResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which secondary relevance pass runs after fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankMode {
    /// Keep the fusion order.
    #[default]
    None,
    /// Re-score candidates by embedding similarity with the original query.
    Embedding,
}

/// BM25 Okapi parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    #[serde(default = "default_k1")]
    pub k1: f32,
    /// Length normalisation strength, in `[0, 1]`.
    #[serde(default = "default_b")]
    pub b: f32,
    /// Floor applied to negative idf values, as a fraction of the mean idf.
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
            epsilon: default_epsilon(),
        }
    }
}

/// Index configuration, usually read from `casefile.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory holding the persisted index.
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    /// Output dimension of the local embedding provider.
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    /// Chunks embedded per provider call during build.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Run query expansion by default.
    #[serde(default = "default_use_expansion")]
    pub use_expansion: bool,
    /// Total number of query variants, original included.
    #[serde(default = "default_max_expansions")]
    pub max_expansions: usize,
    /// Prefix prepended to every query before embedding (e.g. `"query: "`).
    #[serde(default)]
    pub query_prefix: Option<String>,
    /// Secondary relevance pass.
    #[serde(default)]
    pub rerank: RerankMode,
    /// Lexical scoring parameters.
    #[serde(default)]
    pub bm25: Bm25Params,
    /// Result count when a caller does not ask for one.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// Upper bound on requested result counts.
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_dir: default_index_dir(),
            embedding_dimension: default_embedding_dimension(),
            batch_size: default_batch_size(),
            use_expansion: default_use_expansion(),
            max_expansions: default_max_expansions(),
            query_prefix: None,
            rerank: RerankMode::default(),
            bm25: Bm25Params::default(),
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
        }
    }
}

impl IndexConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> CasefileResult<Self> {
        let config: IndexConfig =
            toml::from_str(raw).map_err(|e| CasefileError::Config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read the config at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> CasefileResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reject values the index cannot work with.
    pub fn validate(&self) -> CasefileResult<()> {
        if self.embedding_dimension == 0 {
            return Err(CasefileError::Config(
                "embedding_dimension must be greater than zero".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(CasefileError::Config(
                "batch_size must be greater than zero".into(),
            ));
        }
        if self.max_expansions == 0 {
            return Err(CasefileError::Config(
                "max_expansions must be at least 1".into(),
            ));
        }
        if self.default_top_k == 0 || self.default_top_k > self.max_top_k {
            return Err(CasefileError::Config(format!(
                "default_top_k must be in 1..={}",
                self.max_top_k
            )));
        }
        let Bm25Params { k1, b, epsilon } = self.bm25;
        if !(k1 >= 0.0 && k1.is_finite()) {
            return Err(CasefileError::Config(format!("bm25.k1 out of range: {k1}")));
        }
        if !(0.0..=1.0).contains(&b) {
            return Err(CasefileError::Config(format!("bm25.b out of range: {b}")));
        }
        if !(epsilon >= 0.0 && epsilon.is_finite()) {
            return Err(CasefileError::Config(format!(
                "bm25.epsilon out of range: {epsilon}"
            )));
        }
        Ok(())
    }

    /// Clamp a requested result count to `1..=max_top_k`, using the default when absent.
    pub fn effective_top_k(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_top_k)
            .clamp(1, self.max_top_k)
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("./data/index")
}
fn default_embedding_dimension() -> usize {
    256
}
fn default_batch_size() -> usize {
    32
}
fn default_use_expansion() -> bool {
    true
}
fn default_max_expansions() -> usize {
    3
}
fn default_top_k() -> usize {
    5
}
fn default_max_top_k() -> usize {
    20
}
fn default_k1() -> f32 {
    1.5
}
fn default_b() -> f32 {
    0.75
}
fn default_epsilon() -> f32 {
    0.25
}
