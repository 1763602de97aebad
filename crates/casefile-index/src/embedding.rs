use async_trait::async_trait;
use casefile_core::{CasefileError, CasefileResult};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Trait for computing text embeddings (vector representations).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Compute embedding vector for a single text.
    async fn embed(&self, text: &str) -> CasefileResult<Vec<f32>>;

    /// Compute embeddings for a batch of texts, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> CasefileResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Dimension of the embedding vectors produced by this provider.
    fn dimension(&self) -> usize;
}

/// Subsection citations such as `112(b)` or `1.75(c)(1)`, kept whole so that
/// `112(a)` and `112(b)` land in different buckets.
static CITATION_TOKEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?(?:\([a-z0-9]+\))+").ok());

/// Adjacent word pairs count for half a word.
const PHRASE_WEIGHT: f32 = 0.5;

/// (seed, weight) of the buckets each feature is hashed into.
const BUCKETS: [(u8, f32); 3] = [(0, 1.0), (1, 0.7), (2, 0.5)];

/// Local hashed embedding over words, statute citations and word pairs.
///
/// Needs no model. Every feature is hashed into three buckets weighted by its
/// relative frequency, and the result is L2-normalised. Deterministic, so a
/// persisted index reloads to identical search results.
pub struct LocalEmbedding {
    dimension: usize,
}

impl LocalEmbedding {
    /// Create a provider producing vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for LocalEmbedding {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> CasefileResult<Vec<f32>> {
        if text.is_empty() {
            return Err(CasefileError::Provider("Cannot embed empty text".to_string()));
        }
        if self.dimension == 0 {
            return Err(CasefileError::Provider(
                "Embedding dimension must be greater than zero".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimension];
        let features = features(&words(text));
        let total: f32 = features.values().sum();
        if total == 0.0 {
            return Ok(vector);
        }

        for (feature, weight) in &features {
            let share = weight / total;
            for (seed, scale) in BUCKETS {
                let slot = fnv1a(feature.as_bytes(), seed) as usize % self.dimension;
                vector[slot] += share * scale;
            }
        }

        crate::vector::normalize(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Lowercased words in reading order. Citations stay whole, other tokens
/// split on non-alphanumerics. Single letters are dropped but bare numbers
/// ("claim 1") are kept.
fn words(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut out = Vec::new();
    for raw in lowered.split_whitespace() {
        if let Some(citation) = CITATION_TOKEN.as_ref().and_then(|re| re.find(raw)) {
            out.push(citation.as_str().to_string());
            continue;
        }
        out.extend(
            raw.split(|c: char| !c.is_alphanumeric())
                .filter(|w| w.chars().count() > 1 || w.chars().all(|c| c.is_ascii_digit()))
                .filter(|w| !w.is_empty())
                .map(str::to_string),
        );
    }
    out
}

fn features(words: &[String]) -> HashMap<String, f32> {
    let mut weights: HashMap<String, f32> = HashMap::new();
    for word in words {
        *weights.entry(word.clone()).or_insert(0.0) += 1.0;
    }
    for pair in words.windows(2) {
        *weights.entry(format!("{} {}", pair[0], pair[1])).or_insert(0.0) += PHRASE_WEIGHT;
    }
    weights
}

/// FNV-1a, 32 bit, with a trailing seed byte.
fn fnv1a(data: &[u8], seed: u8) -> u32 {
    let mut hash: u32 = 2166136261;
    for &byte in data.iter().chain(std::iter::once(&seed)) {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}
