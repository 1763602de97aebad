//! Retrieval quality checks against a golden question set.
//!
//! A case passes when a hit whose section label contains the expected
//! section appears in the top `k`. Reports hit rate and mean reciprocal rank.

use std::path::Path;

use casefile_core::{CasefileError, CasefileResult};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::{HybridIndex, SearchHit, SearchRequest};

/// One golden question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
    /// Question as a user would ask it.
    pub query: String,
    /// Section label (or a substring of it) that should be retrieved.
    pub expected_section: String,
    /// Reference answer, kept for humans reading the report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<String>,
}

/// Outcome of one case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseResult {
    /// The question.
    pub query: String,
    /// Section that was expected.
    pub expected_section: String,
    /// 1-based rank of the first matching hit.
    pub rank: Option<usize>,
    /// Sections of the returned hits, in rank order.
    pub retrieved_sections: Vec<String>,
}

/// Aggregate over all cases.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalReport {
    /// Cutoff used for every search.
    pub top_k: usize,
    /// Number of cases run.
    pub cases: usize,
    /// Cases with a matching hit in the top `k`.
    pub hits: usize,
    /// `hits / cases`.
    pub hit_rate: f64,
    /// Mean of `1 / rank`, 0 for misses.
    pub mrr: f64,
    /// Per-case detail.
    pub results: Vec<CaseResult>,
}

/// Read a JSON array of [`EvalCase`] from `path`.
pub async fn load_cases(path: &Path) -> CasefileResult<Vec<EvalCase>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let cases: Vec<EvalCase> = serde_json::from_str(&raw)?;
    if cases.is_empty() {
        return Err(CasefileError::Config(format!(
            "{} contains no evaluation cases",
            path.display()
        )));
    }
    Ok(cases)
}

/// 1-based rank of the first hit whose section contains `expected`.
pub fn first_relevant_rank(hits: &[SearchHit], expected: &str) -> Option<usize> {
    hits.iter()
        .position(|h| h.metadata.section.contains(expected))
        .map(|i| i + 1)
}

/// Run every case through `index` and aggregate the results.
pub async fn evaluate(
    index: &HybridIndex,
    cases: &[EvalCase],
    top_k: usize,
) -> CasefileResult<EvalReport> {
    let mut results = Vec::with_capacity(cases.len());
    for case in cases {
        let hits = index
            .search(&SearchRequest::new(case.query.as_str()).with_top_k(top_k))
            .await?;
        results.push(CaseResult {
            query: case.query.clone(),
            expected_section: case.expected_section.clone(),
            rank: first_relevant_rank(&hits, &case.expected_section),
            retrieved_sections: hits.iter().map(|h| h.metadata.section.clone()).collect(),
        });
    }
    let report = summarize(top_k, results);
    info!(
        cases = report.cases,
        hit_rate = report.hit_rate,
        mrr = report.mrr,
        "Evaluation complete"
    );
    Ok(report)
}

fn summarize(top_k: usize, results: Vec<CaseResult>) -> EvalReport {
    let cases = results.len();
    let hits = results.iter().filter(|r| r.rank.is_some()).count();
    let rr_sum: f64 = results
        .iter()
        .filter_map(|r| r.rank)
        .map(|rank| 1.0 / rank as f64)
        .sum();
    let (hit_rate, mrr) = if cases == 0 {
        (0.0, 0.0)
    } else {
        (hits as f64 / cases as f64, rr_sum / cases as f64)
    };
    EvalReport {
        top_k,
        cases,
        hits,
        hit_rate,
        mrr,
        results,
    }
}
