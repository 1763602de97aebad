use casefile_core::{validate_dimension, CasefileError, CasefileResult};

use crate::chunk_store::ChunkId;

/// Exact (brute-force) inner-product index over L2-normalised vectors.
///
/// Every stored vector and every query is normalised, so the inner product is
/// the cosine similarity regardless of what the embedding provider returns.
/// Vectors are kept in one flat row-major buffer; row `i` belongs to chunk `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIpIndex {
    dimension: usize,
    data: Vec<f32>,
    populated: bool,
}

impl FlatIpIndex {
    /// Create an empty index for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
            populated: false,
        }
    }

    /// Add every chunk embedding at once, in chunk-id order.
    ///
    /// The index is populated exactly once; a second call is an
    /// [`CasefileError::InvalidState`].
    pub fn add(&mut self, embeddings: Vec<Vec<f32>>) -> CasefileResult<()> {
        if self.populated {
            return Err(CasefileError::InvalidState(
                "vector index already populated".into(),
            ));
        }
        let mut data = Vec::with_capacity(embeddings.len() * self.dimension);
        for mut vector in embeddings {
            validate_dimension(self.dimension, vector.len())?;
            normalize(&mut vector);
            data.extend_from_slice(&vector);
        }
        self.data = data;
        self.populated = true;
        Ok(())
    }

    /// Top `k` chunks by descending inner product with `query`.
    ///
    /// Ties are ordered by lower chunk id.
    pub fn search(&self, query: &[f32], k: usize) -> CasefileResult<Vec<(ChunkId, f32)>> {
        if !self.populated {
            return Err(CasefileError::InvalidState(
                "vector index searched before add".into(),
            ));
        }
        validate_dimension(self.dimension, query.len())?;

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(ChunkId, f32)> = self
            .rows()
            .enumerate()
            .map(|(id, row)| (id, dot(row, &query)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    /// Whether no vectors are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Whether [`FlatIpIndex::add`] has run.
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// Flat row-major buffer of normalised vectors.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Rebuild a populated index from a flat buffer of already-normalised vectors.
    pub(crate) fn from_raw(dimension: usize, data: Vec<f32>) -> CasefileResult<Self> {
        if dimension == 0 || data.len() % dimension != 0 {
            return Err(CasefileError::CorruptIndex(format!(
                "vector payload of {} floats is not a multiple of dimension {dimension}",
                data.len()
            )));
        }
        Ok(Self {
            dimension,
            data,
            populated: true,
        })
    }

    fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension.max(1))
    }
}

/// Scale `vector` to unit length in place. Zero vectors are left as-is.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity between two vectors. Zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
