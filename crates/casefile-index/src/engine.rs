use std::path::Path;
use std::sync::Arc;

use casefile_core::{
    Bm25Params, CasefileError, CasefileResult, ChunkMetadata, IndexConfig, MetadataFilter,
    RerankMode,
};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bm25::{tokenize, Bm25Index};
use crate::chunk_store::{ChunkId, ChunkStoreBuilder};
use crate::embedding::{EmbeddingProvider, LocalEmbedding};
use crate::fusion::{resolve_retrieve_k, sort_by_rerank, variant_weight, RankFusion, Signal};
use crate::persistence::IndexFiles;
use crate::query_expansion::{normalize_variants, QueryExpander, RuleBasedExpander};
use crate::rerank::{EmbeddingSimilarityScorer, RelevanceScorer};
use crate::snapshot::{IndexSnapshot, IndexStats};
use crate::source::DocumentSource;
use crate::vector::FlatIpIndex;

/// Tunables of a [`HybridIndex`] that are not providers.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexOptions {
    /// Chunks embedded per provider call during build.
    pub batch_size: usize,
    /// Total number of query variants, original included.
    pub max_expansions: usize,
    /// Prepended to each query variant before embedding.
    pub query_prefix: Option<String>,
    /// Build a lexical index next to the vector index.
    pub lexical: bool,
    /// Lexical scoring parameters.
    pub bm25: Bm25Params,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_expansions: 3,
            query_prefix: None,
            lexical: true,
            bm25: Bm25Params::default(),
        }
    }
}

impl From<&IndexConfig> for IndexOptions {
    fn from(config: &IndexConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_expansions: config.max_expansions,
            query_prefix: config.query_prefix.clone(),
            lexical: true,
            bm25: config.bm25,
        }
    }
}

/// A single search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Natural-language query.
    pub query: String,
    /// Number of hits to return.
    pub top_k: usize,
    /// Candidate pool size; see [`resolve_retrieve_k`].
    pub retrieve_k: Option<usize>,
    /// Metadata predicate applied to fused candidates.
    pub filter: Option<MetadataFilter>,
    /// Run query expansion when an expander is configured.
    pub expand: bool,
}

impl SearchRequest {
    /// A request for the top 5 hits with expansion enabled.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: 5,
            retrieve_k: None,
            filter: None,
            expand: true,
        }
    }

    /// Set the number of hits.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the candidate pool size explicitly.
    pub fn with_retrieve_k(mut self, retrieve_k: usize) -> Self {
        self.retrieve_k = Some(retrieve_k);
        self
    }

    /// Restrict results to chunks matching `filter`.
    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Search with the original query only.
    pub fn without_expansion(mut self) -> Self {
        self.expand = false;
        self
    }
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Position of the chunk in the store.
    pub chunk_id: ChunkId,
    /// Chunk text.
    pub text: String,
    /// Chunk metadata.
    pub metadata: ChunkMetadata,
    /// Rerank score when reranking ran, fusion score otherwise.
    pub score: f32,
    /// Sum of reciprocal-rank contributions.
    pub fusion_score: f32,
    /// Highest vector similarity seen for this chunk.
    pub vector_score: Option<f32>,
    /// Highest lexical score seen for this chunk.
    pub lexical_score: Option<f32>,
    /// Secondary relevance score.
    pub rerank_score: Option<f32>,
}

/// A stored chunk returned by direct lookups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredChunk {
    /// Position of the chunk in the store.
    pub chunk_id: ChunkId,
    /// Chunk text.
    pub text: String,
    /// Chunk metadata.
    pub metadata: ChunkMetadata,
}

/// Result of a direct lookup: every match is counted, at most `max` returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkListing {
    /// Number of matching chunks in the index.
    pub total: usize,
    /// The first matches in id order.
    pub chunks: Vec<StoredChunk>,
}

/// Hybrid vector + lexical retrieval index.
///
/// Holds the live [`IndexSnapshot`] behind a read-write lock. Searches clone
/// the `Arc` and release the lock at once, so they run concurrently with each
/// other and with a rebuild; a build publishes its new snapshot with a single
/// pointer swap. Builds are serialised by their own mutex.
pub struct HybridIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    expander: Option<Arc<dyn QueryExpander>>,
    scorer: Option<Arc<dyn RelevanceScorer>>,
    files: Option<IndexFiles>,
    options: IndexOptions,
    current: RwLock<Option<Arc<IndexSnapshot>>>,
    build_lock: Mutex<()>,
}

impl HybridIndex {
    /// An in-memory index with no expander, no reranker and default options.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            expander: None,
            scorer: None,
            files: None,
            options: IndexOptions::default(),
            current: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    /// Wire up the local providers and persistence described by `config`.
    pub fn from_config(config: &IndexConfig) -> Self {
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(LocalEmbedding::new(config.embedding_dimension));
        let mut index = Self::new(embedder.clone())
            .with_options(IndexOptions::from(config))
            .with_persistence(&config.index_dir);
        if config.use_expansion {
            index = index.with_expander(Arc::new(RuleBasedExpander::new()));
        }
        if config.rerank == RerankMode::Embedding {
            index = index.with_reranker(Arc::new(EmbeddingSimilarityScorer::new(embedder)));
        }
        index
    }

    /// Use `expander` for requests that ask for expansion.
    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    /// Rerank fused candidates with `scorer`.
    pub fn with_reranker(mut self, scorer: Arc<dyn RelevanceScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Persist builds to, and load from, `dir`.
    pub fn with_persistence(mut self, dir: impl AsRef<Path>) -> Self {
        self.files = Some(IndexFiles::new(dir.as_ref()));
        self
    }

    /// Replace the tunables.
    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    /// Whether a snapshot is live.
    pub async fn is_ready(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// The live snapshot, if any.
    pub async fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.current.read().await.clone()
    }

    /// Build a complete new index from `source`, persist it and publish it.
    ///
    /// An empty source is [`CasefileError::EmptyCorpus`]; nothing is written
    /// and the live snapshot is kept. Searches keep running against the old
    /// snapshot until the new one is published.
    pub async fn build(&self, source: &dyn DocumentSource) -> CasefileResult<IndexStats> {
        let _guard = self.build_lock.lock().await;

        let chunks = source.chunks().await?;
        if chunks.is_empty() {
            warn!("Document source produced no chunks, keeping the current index");
            return Err(CasefileError::EmptyCorpus);
        }
        info!(chunks = chunks.len(), "Building index");

        let mut builder = ChunkStoreBuilder::new();
        for chunk in chunks {
            builder.append(chunk.text, chunk.metadata);
        }
        let store = builder.finish();

        let embeddings = self.embed_corpus(store.texts()).await?;
        let mut vectors = FlatIpIndex::new(self.embedder.dimension());
        vectors.add(embeddings)?;

        let lexical = self
            .options
            .lexical
            .then(|| Bm25Index::fit_with(store.texts(), self.options.bm25));

        let snapshot = IndexSnapshot::new(store, vectors, lexical, Uuid::new_v4(), Utc::now())?;
        if let Some(files) = &self.files {
            files.save(&snapshot).await?;
        }

        let stats = snapshot.stats();
        *self.current.write().await = Some(Arc::new(snapshot));
        info!(
            chunks = stats.chunks,
            lexical = stats.lexical_enabled,
            generation = %stats.generation,
            "Index published"
        );
        Ok(stats)
    }

    /// Replace the live snapshot with the persisted one.
    ///
    /// Returns `Ok(false)` when nothing is persisted yet.
    pub async fn load(&self) -> CasefileResult<bool> {
        let _guard = self.build_lock.lock().await;
        let files = self.files.as_ref().ok_or_else(|| {
            CasefileError::InvalidState("no index directory configured".into())
        })?;
        let Some(snapshot) = files.load().await? else {
            return Ok(false);
        };
        let dimension = snapshot.vectors().dimension();
        if dimension != self.embedder.dimension() {
            return Err(CasefileError::DimensionMismatch {
                expected: self.embedder.dimension(),
                actual: dimension,
            });
        }
        *self.current.write().await = Some(Arc::new(snapshot));
        Ok(true)
    }

    /// Load the persisted index, building from `source` if there is none.
    pub async fn load_or_build(&self, source: &dyn DocumentSource) -> CasefileResult<IndexStats> {
        if self.files.is_some() && self.load().await? {
            return self.stats().await;
        }
        self.build(source).await
    }

    /// Run a hybrid search against the live snapshot.
    pub async fn search(&self, request: &SearchRequest) -> CasefileResult<Vec<SearchHit>> {
        let snapshot = self.snapshot().await.ok_or(CasefileError::NotBuilt)?;
        if request.top_k == 0 {
            return Ok(Vec::new());
        }
        let retrieve_k = resolve_retrieve_k(request.top_k, request.retrieve_k);
        let variants = self.query_variants(&request.query, request.expand).await;

        let mut fusion = RankFusion::new();
        for (i, variant) in variants.iter().enumerate() {
            let weight = variant_weight(i);

            let embedding = self.embed_query(variant).await?;
            let dense = snapshot.vectors().search(&embedding, retrieve_k)?;
            fusion.add_ranking(&dense, weight, Signal::Vector);

            if let Some(lexical) = snapshot.lexical() {
                let sparse = lexical.top_k(&tokenize(variant), retrieve_k);
                fusion.add_ranking(&sparse, weight, Signal::Lexical);
            }
        }

        let mut candidates = fusion.into_ranked();
        if let Some(filter) = &request.filter {
            candidates.retain(|c| {
                snapshot
                    .store()
                    .get(c.chunk_id)
                    .is_some_and(|(_, meta)| filter.matches(meta))
            });
        }
        candidates.truncate(retrieve_k);

        let reranked = match &self.scorer {
            Some(scorer) if !candidates.is_empty() => {
                let texts: Vec<&str> = candidates
                    .iter()
                    .filter_map(|c| snapshot.store().get(c.chunk_id).map(|(text, _)| text))
                    .collect();
                let scores = scorer
                    .score_batch(&request.query, &texts)
                    .await
                    .map_err(as_provider_error)?;
                if scores.len() != candidates.len() {
                    return Err(CasefileError::Provider(format!(
                        "reranker returned {} scores for {} candidates",
                        scores.len(),
                        candidates.len()
                    )));
                }
                for (candidate, score) in candidates.iter_mut().zip(scores) {
                    candidate.rerank_score = Some(score);
                }
                sort_by_rerank(&mut candidates);
                true
            }
            _ => false,
        };
        candidates.truncate(request.top_k);

        debug!(
            variants = variants.len(),
            retrieve_k,
            reranked,
            hits = candidates.len(),
            "Search complete"
        );

        Ok(candidates
            .into_iter()
            .filter_map(|c| {
                let (text, meta) = snapshot.store().get(c.chunk_id)?;
                Some(SearchHit {
                    chunk_id: c.chunk_id,
                    text: text.to_string(),
                    metadata: meta.clone(),
                    score: c.rerank_score.unwrap_or(c.fusion_score),
                    fusion_score: c.fusion_score,
                    vector_score: c.vector_score,
                    lexical_score: c.lexical_score,
                    rerank_score: c.rerank_score,
                })
            })
            .collect())
    }

    /// Chunks whose section label contains `pattern`, in id order.
    pub async fn section_chunks(&self, pattern: &str, max: usize) -> CasefileResult<ChunkListing> {
        self.list_where(max, |meta| meta.section.contains(pattern)).await
    }

    /// Chunks satisfying `filter`, in id order.
    pub async fn chunks_matching(
        &self,
        filter: &MetadataFilter,
        max: usize,
    ) -> CasefileResult<ChunkListing> {
        self.list_where(max, |meta| filter.matches(meta)).await
    }

    /// Summary of the live snapshot.
    pub async fn stats(&self) -> CasefileResult<IndexStats> {
        let snapshot = self.snapshot().await.ok_or(CasefileError::NotBuilt)?;
        Ok(snapshot.stats())
    }

    async fn list_where<F>(&self, max: usize, keep: F) -> CasefileResult<ChunkListing>
    where
        F: Fn(&ChunkMetadata) -> bool,
    {
        let snapshot = self.snapshot().await.ok_or(CasefileError::NotBuilt)?;
        let mut total = 0;
        let mut chunks = Vec::new();
        for (chunk_id, text, meta) in snapshot.store().iter() {
            if !keep(meta) {
                continue;
            }
            total += 1;
            if chunks.len() < max {
                chunks.push(StoredChunk {
                    chunk_id,
                    text: text.to_string(),
                    metadata: meta.clone(),
                });
            }
        }
        Ok(ChunkListing { total, chunks })
    }

    async fn query_variants(&self, query: &str, expand: bool) -> Vec<String> {
        let max = self.options.max_expansions;
        let expander = match &self.expander {
            Some(expander) if expand && max > 1 => expander,
            _ => return vec![query.to_string()],
        };
        match expander.expand(query, max).await {
            Ok(variants) => normalize_variants(query, variants, max),
            Err(e) => {
                warn!(error = %e, "Query expansion failed, searching with the original query only");
                vec![query.to_string()]
            }
        }
    }

    async fn embed_query(&self, variant: &str) -> CasefileResult<Vec<f32>> {
        let text = match &self.options.query_prefix {
            Some(prefix) => format!("{prefix}{variant}"),
            None => variant.to_string(),
        };
        self.embedder.embed(&text).await.map_err(as_provider_error)
    }

    async fn embed_corpus(&self, texts: &[String]) -> CasefileResult<Vec<Vec<f32>>> {
        let batch_size = self.options.batch_size.max(1);
        let mut embeddings = Vec::with_capacity(texts.len());
        for (n, batch) in texts.chunks(batch_size).enumerate() {
            let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
            let vectors = self
                .embedder
                .embed_batch(&refs)
                .await
                .map_err(as_provider_error)?;
            if vectors.len() != refs.len() {
                return Err(CasefileError::Provider(format!(
                    "embedding batch {n} returned {} vectors for {} texts",
                    vectors.len(),
                    refs.len()
                )));
            }
            embeddings.extend(vectors);
            debug!(batch = n, embedded = embeddings.len(), total = texts.len(), "Embedded batch");
        }
        Ok(embeddings)
    }
}

fn as_provider_error(e: CasefileError) -> CasefileError {
    match e {
        CasefileError::Provider(_) | CasefileError::DimensionMismatch { .. } => e,
        other => CasefileError::Provider(other.to_string()),
    }
}
