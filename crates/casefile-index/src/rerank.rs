use std::sync::Arc;

use async_trait::async_trait;
use casefile_core::CasefileResult;

use crate::embedding::EmbeddingProvider;
use crate::vector::cosine_similarity;

/// Secondary relevance pass over fused candidates.
///
/// Higher scores mean more relevant. Scores are only compared with each
/// other within one search, so any scale works.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Score one `(query, passage)` pair.
    async fn score(&self, query: &str, text: &str) -> CasefileResult<f32>;

    /// Score many passages against the same query, in input order.
    async fn score_batch(&self, query: &str, texts: &[&str]) -> CasefileResult<Vec<f32>> {
        let mut scores = Vec::with_capacity(texts.len());
        for text in texts {
            scores.push(self.score(query, text).await?);
        }
        Ok(scores)
    }
}

/// Reranks by cosine similarity between query and passage embeddings.
pub struct EmbeddingSimilarityScorer {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingSimilarityScorer {
    /// Wrap an embedding provider.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl RelevanceScorer for EmbeddingSimilarityScorer {
    async fn score(&self, query: &str, text: &str) -> CasefileResult<f32> {
        let q = self.embedder.embed(query).await?;
        let t = self.embedder.embed(text).await?;
        Ok(cosine_similarity(&q, &t))
    }

    async fn score_batch(&self, query: &str, texts: &[&str]) -> CasefileResult<Vec<f32>> {
        let q = self.embedder.embed(query).await?;
        let embedded = self.embedder.embed_batch(texts).await?;
        Ok(embedded.iter().map(|t| cosine_similarity(&q, t)).collect())
    }
}
