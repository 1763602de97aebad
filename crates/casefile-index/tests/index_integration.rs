#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the casefile-index crate.
//!
//! Covers the build/search/save/load lifecycle, fusion arithmetic, expansion
//! weighting and failure recovery, metadata filtering, reranking, provider
//! failures, corruption detection and rebuild-while-serving.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use casefile_core::{CasefileError, CasefileResult, ChunkMetadata, MetadataFilter};
use casefile_index::{
    evaluate, resolve_retrieve_k, EmbeddingProvider, EvalCase, HybridIndex, IndexOptions,
    JsonlSource, LocalEmbedding, QueryExpander, RelevanceScorer, RuleBasedExpander, SearchRequest,
    SourceChunk, VecSource,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Embedding provider backed by a fixed text -> vector table.
struct TableEmbedding {
    dim: usize,
    table: HashMap<String, Vec<f32>>,
}

impl TableEmbedding {
    fn new(dim: usize, entries: &[(&str, Vec<f32>)]) -> Self {
        Self {
            dim,
            table: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for TableEmbedding {
    async fn embed(&self, text: &str) -> CasefileResult<Vec<f32>> {
        self.table
            .get(text)
            .cloned()
            .ok_or_else(|| CasefileError::Provider(format!("no vector for {text:?}")))
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// Always fails.
struct BrokenEmbedding;

#[async_trait]
impl EmbeddingProvider for BrokenEmbedding {
    async fn embed(&self, _text: &str) -> CasefileResult<Vec<f32>> {
        Err(CasefileError::Provider("model unavailable".into()))
    }

    fn dimension(&self) -> usize {
        4
    }
}

/// Counts embed calls on top of the local provider.
struct CountingEmbedding {
    inner: LocalEmbedding,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedding {
    async fn embed(&self, text: &str) -> CasefileResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

/// Returns a fixed list regardless of the query.
struct FixedExpander(Vec<String>);

#[async_trait]
impl QueryExpander for FixedExpander {
    async fn expand(&self, _query: &str, _max: usize) -> CasefileResult<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// Always fails.
struct FailingExpander;

#[async_trait]
impl QueryExpander for FailingExpander {
    async fn expand(&self, _query: &str, _max: usize) -> CasefileResult<Vec<String>> {
        Err(CasefileError::Expansion("generator timed out".into()))
    }
}

/// Scores passages by length, longest first.
struct LengthScorer;

#[async_trait]
impl RelevanceScorer for LengthScorer {
    async fn score(&self, _query: &str, text: &str) -> CasefileResult<f32> {
        Ok(text.len() as f32)
    }
}

/// Gives every passage the same score.
struct ConstantScorer;

#[async_trait]
impl RelevanceScorer for ConstantScorer {
    async fn score(&self, _query: &str, _text: &str) -> CasefileResult<f32> {
        Ok(0.5)
    }
}

/// Always fails.
struct BrokenScorer;

#[async_trait]
impl RelevanceScorer for BrokenScorer {
    async fn score(&self, _query: &str, _text: &str) -> CasefileResult<f32> {
        Err(CasefileError::Provider("reranker offline".into()))
    }
}

fn patent_law_corpus() -> VecSource {
    let chunks = [
        ("MPEP", "MPEP 2173", "[MPEP 2173] Claims must particularly point out and distinctly claim the subject matter; indefinite claim language is rejected under 35 U.S.C. 112(b)."),
        ("MPEP", "MPEP 2163", "[MPEP 2163] The written description requirement asks whether the specification shows possession of the claimed invention."),
        ("MPEP", "MPEP 2164", "[MPEP 2164] Enablement requires that a skilled artisan can make and use the invention without undue experimentation."),
        ("35_USC", "35 USC 101", "[35 USC 101] Whoever invents or discovers any new and useful process, machine, manufacture, or composition of matter may obtain a patent."),
        ("35_USC", "35 USC 103", "[35 USC 103] A patent may not be obtained if the claimed invention would have been obvious to a person having ordinary skill in the art."),
        ("37_CFR", "37 CFR 1.72", "[37 CFR 1.72] The abstract should not exceed 150 words and must be on a separate sheet."),
        ("SUBSEQUENT", "Update 2024-02", "[Update 2024-02] Revised guidance on inventorship for AI-assisted inventions."),
    ];
    VecSource::new(
        chunks
            .iter()
            .map(|(source, section, text)| {
                SourceChunk::new(*text, ChunkMetadata::new(*source, *section).with_source_flags())
            })
            .collect(),
    )
}

fn local_index() -> HybridIndex {
    HybridIndex::new(Arc::new(LocalEmbedding::default()))
}

fn persisted_index(dir: &TempDir) -> HybridIndex {
    local_index()
        .with_expander(Arc::new(RuleBasedExpander::new()))
        .with_persistence(dir.path())
}

// ---------------------------------------------------------------------------
// 1. Build keeps chunks and metadata paired
// ---------------------------------------------------------------------------

#[tokio::test]
async fn build_keeps_chunks_and_metadata_paired() {
    let index = local_index();
    let stats = index.build(&patent_law_corpus()).await.unwrap();
    assert_eq!(stats.chunks, 7);
    assert_eq!(stats.sources.get("35_USC"), Some(&2));
    assert_eq!(stats.sources.get("SUBSEQUENT"), Some(&1));

    let snapshot = index.snapshot().await.unwrap();
    let store = snapshot.store();
    assert_eq!(store.texts().len(), store.metadata().len());
    assert_eq!(snapshot.vectors().len(), store.len());
    for (_, text, meta) in store.iter() {
        assert!(text.starts_with(&format!("[{}]", meta.section)));
    }
}

// ---------------------------------------------------------------------------
// 2. Save/load round-trip returns identical search output
// ---------------------------------------------------------------------------

#[tokio::test]
async fn persisted_index_reloads_with_identical_results() {
    let dir = TempDir::new().unwrap();
    let built = persisted_index(&dir);
    built.build(&patent_law_corpus()).await.unwrap();

    let reloaded = persisted_index(&dir);
    assert!(reloaded.load().await.unwrap());

    for query in ["claim definiteness", "obviousness 35 USC 103", "abstract word limit"] {
        let request = SearchRequest::new(query).with_top_k(4);
        let a = built.search(&request).await.unwrap();
        let b = reloaded.search(&request).await.unwrap();
        assert_eq!(a, b, "results differ after reload for {query:?}");
    }
    assert_eq!(
        built.stats().await.unwrap().generation,
        reloaded.stats().await.unwrap().generation
    );
}

#[tokio::test]
async fn load_on_first_run_reports_nothing() {
    let dir = TempDir::new().unwrap();
    let index = persisted_index(&dir);
    assert!(!index.load().await.unwrap());
    assert!(matches!(
        index.search(&SearchRequest::new("anything")).await,
        Err(CasefileError::NotBuilt)
    ));
}

#[tokio::test]
async fn load_or_build_prefers_persisted_index() {
    let dir = TempDir::new().unwrap();
    let first = persisted_index(&dir);
    let built = first.load_or_build(&patent_law_corpus()).await.unwrap();

    let second = persisted_index(&dir);
    let loaded = second
        .load_or_build(&VecSource::new(vec![]))
        .await
        .unwrap();
    assert_eq!(built.generation, loaded.generation);
}

// ---------------------------------------------------------------------------
// 3. RRF arithmetic across vector and lexical signals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rrf_sums_contributions_and_keeps_first_seen_order_on_ties() {
    // Vector ranks: c2, c0, c1. Lexical ranks for "zeta": c1, c0, c2.
    let embedder = TableEmbedding::new(
        3,
        &[
            ("red apple", vec![0.0, 0.0, 1.0]),
            ("green zeta", vec![0.0, 1.0, 0.0]),
            ("blue sky", vec![1.0, 0.0, 0.0]),
            ("zeta", vec![1.0, 0.0, 0.0]),
        ],
    );
    let index = HybridIndex::new(Arc::new(embedder));
    let source = VecSource::new(
        ["red apple", "green zeta", "blue sky"]
            .iter()
            .map(|t| SourceChunk::new(*t, ChunkMetadata::new("MPEP", *t)))
            .collect(),
    );
    index.build(&source).await.unwrap();

    let hits = index
        .search(&SearchRequest::new("zeta").with_top_k(3))
        .await
        .unwrap();
    let ids: Vec<usize> = hits.iter().map(|h| h.chunk_id).collect();
    assert_eq!(ids, vec![2, 1, 0]);

    let expected = 1.0 / 61.0 + 1.0 / 63.0;
    assert!((hits[0].fusion_score - expected).abs() < 1e-6);
    assert!((hits[0].fusion_score - 0.03226).abs() < 1e-4);
    assert_eq!(hits[0].fusion_score, hits[1].fusion_score);
    assert!((hits[2].fusion_score - 2.0 / 62.0).abs() < 1e-6);

    assert_eq!(hits[0].vector_score, Some(1.0));
    assert_eq!(hits[0].lexical_score, Some(0.0));
    assert!(hits[1].lexical_score.unwrap() > 0.0);
}

// ---------------------------------------------------------------------------
// 4. Expanded variants contribute with half weight
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expansion_variant_contributes_half_weight() {
    let embedder = TableEmbedding::new(
        2,
        &[
            ("chunk east", vec![1.0, 0.0]),
            ("chunk north", vec![0.0, 1.0]),
            ("q", vec![1.0, 0.0]),
            ("variant", vec![0.0, 1.0]),
        ],
    );
    let index = HybridIndex::new(Arc::new(embedder))
        .with_options(IndexOptions {
            lexical: false,
            ..IndexOptions::default()
        })
        .with_expander(Arc::new(FixedExpander(vec!["q".into(), "variant".into()])));
    let source = VecSource::new(vec![
        SourceChunk::new("chunk east", ChunkMetadata::new("MPEP", "east")),
        SourceChunk::new("chunk north", ChunkMetadata::new("MPEP", "north")),
    ]);
    index.build(&source).await.unwrap();

    // each signal retrieves one chunk; drop the original query's hit by filter
    let request = SearchRequest::new("q")
        .with_retrieve_k(1)
        .with_filter(MetadataFilter::eq("section", "north"));
    let hits = index.search(&request).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk_id, 1);
    assert!((hits[0].fusion_score - 0.5 / 61.0).abs() < 1e-7);
    assert!((hits[0].fusion_score - 0.008197).abs() < 1e-6);
    assert_eq!(hits[0].lexical_score, None);
}

#[tokio::test]
async fn expander_output_is_normalised_and_capped() {
    let embedder = TableEmbedding::new(
        2,
        &[
            ("only chunk", vec![1.0, 0.0]),
            ("q", vec![1.0, 0.0]),
            ("a", vec![0.0, 1.0]),
        ],
    );
    // "b" and "c" have no vector; embedding them would fail the search
    let index = HybridIndex::new(Arc::new(embedder))
        .with_options(IndexOptions {
            max_expansions: 2,
            ..IndexOptions::default()
        })
        .with_expander(Arc::new(FixedExpander(vec![
            "a".into(),
            "b".into(),
            "c".into(),
        ])));
    index
        .build(&VecSource::new(vec![SourceChunk::new(
            "only chunk",
            ChunkMetadata::new("MPEP", "s"),
        )]))
        .await
        .unwrap();

    let hits = index.search(&SearchRequest::new("q")).await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn repeated_variants_are_fused_once() {
    let embedder = TableEmbedding::new(
        2,
        &[("only chunk", vec![1.0, 0.0]), ("q", vec![1.0, 0.0])],
    );
    let index = HybridIndex::new(Arc::new(embedder))
        .with_options(IndexOptions {
            lexical: false,
            ..IndexOptions::default()
        })
        .with_expander(Arc::new(FixedExpander(vec!["q".into(), "q".into()])));
    index
        .build(&VecSource::new(vec![SourceChunk::new(
            "only chunk",
            ChunkMetadata::new("MPEP", "s"),
        )]))
        .await
        .unwrap();

    let hits = index.search(&SearchRequest::new("q")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!((hits[0].fusion_score - 1.0 / 61.0).abs() < 1e-7);
}

// ---------------------------------------------------------------------------
// 5. retrieveK resolution
// ---------------------------------------------------------------------------

#[test]
fn retrieve_k_defaults_and_caps() {
    assert_eq!(resolve_retrieve_k(5, None), 20);
    assert_eq!(resolve_retrieve_k(13, None), 50);
    assert_eq!(resolve_retrieve_k(5, Some(500)), 100);
}

// ---------------------------------------------------------------------------
// 6. Empty corpus leaves the previous index untouched
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_corpus_keeps_previous_index_and_files() {
    let dir = TempDir::new().unwrap();
    let index = persisted_index(&dir);
    let before = index.build(&patent_law_corpus()).await.unwrap();
    let vectors_before = std::fs::read(dir.path().join("vectors.bin")).unwrap();
    let metadata_before = std::fs::read(dir.path().join("metadata.json")).unwrap();

    let err = index.build(&VecSource::new(vec![])).await.unwrap_err();
    assert!(matches!(err, CasefileError::EmptyCorpus));

    assert_eq!(std::fs::read(dir.path().join("vectors.bin")).unwrap(), vectors_before);
    assert_eq!(std::fs::read(dir.path().join("metadata.json")).unwrap(), metadata_before);
    assert_eq!(index.stats().await.unwrap().generation, before.generation);
    assert!(!index
        .search(&SearchRequest::new("enablement"))
        .await
        .unwrap()
        .is_empty());
}

// ---------------------------------------------------------------------------
// 7. Metadata filters exclude non-matching chunks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn filter_excludes_non_matching_chunks() {
    let index = local_index();
    index.build(&patent_law_corpus()).await.unwrap();

    let request = SearchRequest::new("claims patent invention")
        .with_top_k(10)
        .with_filter(MetadataFilter::flag("is_statute", true));
    let hits = index.search(&request).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.metadata.is_statute));

    let request = SearchRequest::new("claims").with_filter(MetadataFilter::source(["EPO"]));
    assert!(index.search(&request).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// 8. Expansion failure degrades to the original query
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expansion_failure_is_absorbed() {
    let failing = local_index().with_expander(Arc::new(FailingExpander));
    failing.build(&patent_law_corpus()).await.unwrap();

    let request = SearchRequest::new("written description possession");
    let with_failed_expansion = failing.search(&request).await.unwrap();
    let plain = failing.search(&request.clone().without_expansion()).await.unwrap();
    assert!(!with_failed_expansion.is_empty());
    assert_eq!(with_failed_expansion, plain);
}

#[tokio::test]
async fn expansion_runs_one_embedding_per_variant() {
    let embedder = Arc::new(CountingEmbedding {
        inner: LocalEmbedding::default(),
        calls: AtomicUsize::new(0),
    });
    let index = HybridIndex::new(embedder.clone())
        .with_expander(Arc::new(RuleBasedExpander::new()));
    index.build(&patent_law_corpus()).await.unwrap();
    let after_build = embedder.calls.load(Ordering::SeqCst);
    assert_eq!(after_build, 7);

    // two claim triggers fire, so original + 2 variants
    index
        .search(&SearchRequest::new("dependent claim format"))
        .await
        .unwrap();
    assert_eq!(embedder.calls.load(Ordering::SeqCst) - after_build, 3);

    index
        .search(&SearchRequest::new("dependent claim format").without_expansion())
        .await
        .unwrap();
    assert_eq!(embedder.calls.load(Ordering::SeqCst) - after_build, 4);
}

// ---------------------------------------------------------------------------
// 9. Reranking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn without_reranker_score_is_fusion_score() {
    let index = local_index();
    index.build(&patent_law_corpus()).await.unwrap();
    let hits = index
        .search(&SearchRequest::new("obvious to a person of ordinary skill").with_top_k(7))
        .await
        .unwrap();
    assert_eq!(hits.len(), 7);
    for hit in &hits {
        assert_eq!(hit.score, hit.fusion_score);
        assert!(hit.rerank_score.is_none());
    }
    assert!(hits.windows(2).all(|w| w[0].fusion_score >= w[1].fusion_score));
}

#[tokio::test]
async fn reranker_reorders_by_its_own_score() {
    let index = local_index().with_reranker(Arc::new(LengthScorer));
    index.build(&patent_law_corpus()).await.unwrap();
    let hits = index
        .search(&SearchRequest::new("patent").with_top_k(3))
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    for hit in &hits {
        assert_eq!(Some(hit.score), hit.rerank_score);
        assert_eq!(hit.score, hit.text.len() as f32);
    }
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn reranker_ties_keep_fusion_order() {
    let plain = local_index();
    plain.build(&patent_law_corpus()).await.unwrap();
    let reranked = local_index().with_reranker(Arc::new(ConstantScorer));
    reranked.build(&patent_law_corpus()).await.unwrap();

    let request = SearchRequest::new("claim language specification").with_top_k(5);
    let a: Vec<usize> = plain.search(&request).await.unwrap().iter().map(|h| h.chunk_id).collect();
    let b = reranked.search(&request).await.unwrap();
    assert_eq!(a, b.iter().map(|h| h.chunk_id).collect::<Vec<_>>());
    assert!(b.iter().all(|h| h.score == 0.5));
}

// ---------------------------------------------------------------------------
// 10. Provider failures propagate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn embedding_failure_during_build_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let index = HybridIndex::new(Arc::new(BrokenEmbedding)).with_persistence(dir.path());
    let err = index.build(&patent_law_corpus()).await.unwrap_err();
    assert!(matches!(err, CasefileError::Provider(_)));
    assert!(!dir.path().join("metadata.json").exists());
    assert!(!index.is_ready().await);
}

#[tokio::test]
async fn reranker_failure_propagates() {
    let index = local_index().with_reranker(Arc::new(BrokenScorer));
    index.build(&patent_law_corpus()).await.unwrap();
    let err = index.search(&SearchRequest::new("novelty")).await.unwrap_err();
    assert_eq!(err.to_string(), "Provider error: reranker offline");
}

#[tokio::test]
async fn query_prefix_is_applied_before_embedding() {
    let embedder = TableEmbedding::new(
        2,
        &[("doc", vec![1.0, 0.0]), ("query: doc", vec![1.0, 0.0])],
    );
    let index = HybridIndex::new(Arc::new(embedder)).with_options(IndexOptions {
        query_prefix: Some("query: ".into()),
        ..IndexOptions::default()
    });
    index
        .build(&VecSource::new(vec![SourceChunk::new(
            "doc",
            ChunkMetadata::new("MPEP", "s"),
        )]))
        .await
        .unwrap();
    // the table has no entry for the bare query, so success proves the prefix
    let hits = index.search(&SearchRequest::new("doc")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].vector_score.is_some());
}

// ---------------------------------------------------------------------------
// 11. Corruption and incompatibility are detected on load
// ---------------------------------------------------------------------------

#[tokio::test]
async fn corrupt_metadata_count_is_detected() {
    let dir = TempDir::new().unwrap();
    persisted_index(&dir).build(&patent_law_corpus()).await.unwrap();

    let path = dir.path().join("metadata.json");
    let mut doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    doc["records"].as_array_mut().unwrap().pop();
    std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

    let err = persisted_index(&dir).load().await.unwrap_err();
    assert!(matches!(err, CasefileError::CorruptIndex(_)));
    assert!(err.requires_rebuild());
}

#[tokio::test]
async fn lexical_posting_past_corpus_fails_load_not_search() {
    let dir = TempDir::new().unwrap();
    persisted_index(&dir).build(&patent_law_corpus()).await.unwrap();

    let path = dir.path().join("lexical.json");
    let mut doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    doc["index"]["postings"]["patent"] = serde_json::json!([[42, 1.0]]);
    std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

    let reopened = persisted_index(&dir);
    let err = reopened.load().await.unwrap_err();
    assert!(err.requires_rebuild());
    assert!(!reopened.is_ready().await);
    assert!(matches!(
        reopened.search(&SearchRequest::new("patent")).await,
        Err(CasefileError::NotBuilt)
    ));
}

#[tokio::test]
async fn loading_with_other_dimension_is_rejected() {
    let dir = TempDir::new().unwrap();
    persisted_index(&dir).build(&patent_law_corpus()).await.unwrap();

    let other = HybridIndex::new(Arc::new(LocalEmbedding::new(64))).with_persistence(dir.path());
    assert!(matches!(
        other.load().await,
        Err(CasefileError::DimensionMismatch {
            expected: 64,
            actual: 256
        })
    ));
}

// ---------------------------------------------------------------------------
// 12. Searches keep running while a rebuild publishes a new snapshot
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rebuild_while_serving() {
    let dir = TempDir::new().unwrap();
    let index = Arc::new(persisted_index(&dir));
    let first = index.build(&patent_law_corpus()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let index = index.clone();
        handles.push(tokio::spawn(async move {
            let query = if i % 2 == 0 { "enablement" } else { "35 USC 101 eligible" };
            index.search(&SearchRequest::new(query)).await
        }));
    }
    let rebuild = {
        let index = index.clone();
        tokio::spawn(async move { index.build(&patent_law_corpus()).await })
    };

    for handle in handles {
        let hits = handle.await.unwrap().unwrap();
        assert!(!hits.is_empty());
    }
    let second = rebuild.await.unwrap().unwrap();
    assert_ne!(first.generation, second.generation);
    assert_eq!(index.stats().await.unwrap().generation, second.generation);
}

// ---------------------------------------------------------------------------
// 13. JSONL corpus, section lookup and evaluation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn jsonl_corpus_end_to_end() {
    let dir = TempDir::new().unwrap();
    let corpus = dir.path().join("corpus.jsonl");
    let filler = " The examiner should consider the claims as a whole.".repeat(12);
    let lines = [
        serde_json::json!({
            "document": format!("Claims must be definite under 35 U.S.C. 112(b).{filler}"),
            "section": "MPEP 2173",
            "source": "MPEP",
            "page": 1
        }),
        serde_json::json!({
            "document": "Any person who invents any new and useful process may obtain a patent therefor.",
            "section": "35 USC 101",
            "source": "35_USC"
        }),
    ];
    let body: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    std::fs::write(&corpus, body.join("\n")).unwrap();

    let index = local_index().with_persistence(dir.path().join("index"));
    let stats = index.build(&JsonlSource::new(&corpus)).await.unwrap();
    assert!(stats.chunks >= 3, "long document should split into several chunks");

    let listing = index.section_chunks("MPEP 2173", 50).await.unwrap();
    assert_eq!(listing.total, stats.chunks - 1);
    assert!(listing.chunks.iter().all(|c| c.text.starts_with("[MPEP 2173] ")));
    assert!(listing.chunks[0].metadata.flag("has_usc_ref"));

    let cases = vec![
        EvalCase {
            query: "who may obtain a patent for a new and useful process".into(),
            expected_section: "35 USC 101".into(),
            ground_truth: None,
        },
        EvalCase {
            query: "definite claims".into(),
            expected_section: "MPEP 2173".into(),
            ground_truth: None,
        },
    ];
    let report = evaluate(&index, &cases, 3).await.unwrap();
    assert_eq!(report.cases, 2);
    assert_eq!(report.hits, 2);
    assert!(report.mrr > 0.0 && report.mrr <= 1.0);
}
