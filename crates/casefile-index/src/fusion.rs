use std::collections::HashMap;

use crate::chunk_store::ChunkId;

/// RRF smoothing constant.
pub const RRF_K: f32 = 60.0;

/// Fusion weight of the original query.
pub const ORIGINAL_QUERY_WEIGHT: f32 = 1.0;

/// Fusion weight of every expanded variant.
pub const EXPANSION_WEIGHT: f32 = 0.5;

/// Candidate pool size used when the caller does not ask for one, capped.
pub const DEFAULT_RETRIEVE_K_CAP: usize = 50;

/// Hard upper bound on an explicitly requested candidate pool.
pub const MAX_RETRIEVE_K: usize = 100;

/// Candidate pool size for a search.
///
/// Unspecified: `min(top_k * 4, 50)`. Specified: `min(retrieve_k, 100)`.
pub fn resolve_retrieve_k(top_k: usize, retrieve_k: Option<usize>) -> usize {
    match retrieve_k {
        Some(k) => k.min(MAX_RETRIEVE_K),
        None => top_k.saturating_mul(4).min(DEFAULT_RETRIEVE_K_CAP),
    }
}

/// Weight of the `i`-th query variant. Variant 0 is the original query.
pub fn variant_weight(index: usize) -> f32 {
    if index == 0 {
        ORIGINAL_QUERY_WEIGHT
    } else {
        EXPANSION_WEIGHT
    }
}

/// Contribution of one ranked appearance: `weight / (60 + rank + 1)`, rank 0-based.
pub fn rrf_contribution(weight: f32, rank: usize) -> f32 {
    weight / (RRF_K + rank as f32 + 1.0)
}

/// Which retrieval signal produced a ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Dense vector similarity.
    Vector,
    /// BM25 lexical score.
    Lexical,
}

/// Per-search record for one chunk. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Chunk the record belongs to.
    pub chunk_id: ChunkId,
    /// Highest vector similarity observed across variants.
    pub vector_score: Option<f32>,
    /// Highest lexical score observed across variants.
    pub lexical_score: Option<f32>,
    /// Sum of all RRF contributions.
    pub fusion_score: f32,
    /// Secondary relevance score, if reranking ran.
    pub rerank_score: Option<f32>,
}

impl Candidate {
    fn new(chunk_id: ChunkId) -> Self {
        Self {
            chunk_id,
            vector_score: None,
            lexical_score: None,
            fusion_score: 0.0,
            rerank_score: None,
        }
    }
}

/// Accumulates weighted reciprocal-rank contributions from many rankings.
///
/// Candidates are kept in first-seen order so that a stable sort on the
/// fused score breaks ties deterministically.
#[derive(Debug, Default)]
pub struct RankFusion {
    candidates: Vec<Candidate>,
    positions: HashMap<ChunkId, usize>,
}

impl RankFusion {
    /// Start an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one ranked list (best first) from `signal` with `weight`.
    pub fn add_ranking(&mut self, ranking: &[(ChunkId, f32)], weight: f32, signal: Signal) {
        for (rank, &(chunk_id, raw)) in ranking.iter().enumerate() {
            let pos = *self.positions.entry(chunk_id).or_insert_with(|| {
                self.candidates.push(Candidate::new(chunk_id));
                self.candidates.len() - 1
            });
            let candidate = &mut self.candidates[pos];
            candidate.fusion_score += rrf_contribution(weight, rank);
            let slot = match signal {
                Signal::Vector => &mut candidate.vector_score,
                Signal::Lexical => &mut candidate.lexical_score,
            };
            *slot = Some(slot.map_or(raw, |prev| prev.max(raw)));
        }
    }

    /// Number of distinct chunks seen.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether no ranking has contributed anything.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates by descending fused score; ties keep first-seen order.
    pub fn into_ranked(self) -> Vec<Candidate> {
        let mut candidates = self.candidates;
        candidates.sort_by(|a, b| b.fusion_score.total_cmp(&a.fusion_score));
        candidates
    }
}

/// Stable sort by descending rerank score. Unscored candidates sink.
pub fn sort_by_rerank(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        let a = a.rerank_score.unwrap_or(f32::NEG_INFINITY);
        let b = b.rerank_score.unwrap_or(f32::NEG_INFINITY);
        b.total_cmp(&a)
    });
}
