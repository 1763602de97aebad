use std::collections::HashMap;

use casefile_core::{Bm25Params, CasefileError, CasefileResult};
use serde::{Deserialize, Serialize};

use crate::chunk_store::ChunkId;

/// Tokenize text into lowercase whitespace-separated words.
///
/// No stemming, no stopwords, punctuation stays attached to its word.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// A BM25 Okapi index over the whole chunk corpus.
///
/// Fitted once from every chunk text, in chunk-id order. Scoring returns a
/// value for every chunk, so the result of [`Bm25Index::score`] can be
/// indexed directly by [`ChunkId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bm25Index {
    params: Bm25Params,
    /// term -> [(chunk_id, term_frequency)], chunk ids ascending
    postings: HashMap<String, Vec<(ChunkId, f32)>>,
    /// term -> idf, with negative values already floored
    idf: HashMap<String, f32>,
    /// chunk_id -> token count
    doc_lengths: Vec<f32>,
    avg_doc_length: f32,
}

impl Bm25Index {
    /// Fit an index over `texts` using the default parameters.
    pub fn fit<S: AsRef<str>>(texts: &[S]) -> Self {
        Self::fit_with(texts, Bm25Params::default())
    }

    /// Fit an index over `texts`.
    ///
    /// `idf(t) = ln((N - n_t + 0.5) / (n_t + 0.5))`. Terms present in more
    /// than half the corpus get a negative idf, which is replaced by
    /// `epsilon * mean_idf`.
    pub fn fit_with<S: AsRef<str>>(texts: &[S], params: Bm25Params) -> Self {
        let mut postings: HashMap<String, Vec<(ChunkId, f32)>> = HashMap::new();
        let mut doc_lengths = Vec::with_capacity(texts.len());

        for (id, text) in texts.iter().enumerate() {
            let tokens = tokenize(text.as_ref());
            doc_lengths.push(tokens.len() as f32);

            let mut term_freq: HashMap<String, f32> = HashMap::new();
            for token in tokens {
                *term_freq.entry(token).or_insert(0.0) += 1.0;
            }
            for (term, freq) in term_freq {
                postings.entry(term).or_default().push((id, freq));
            }
        }

        let n = texts.len() as f32;
        let total_len: f32 = doc_lengths.iter().sum();
        let avg_doc_length = if texts.is_empty() { 0.0 } else { total_len / n };

        let mut idf: HashMap<String, f32> = HashMap::with_capacity(postings.len());
        let mut idf_sum = 0.0f32;
        let mut negative = Vec::new();
        for (term, docs) in &postings {
            let df = docs.len() as f32;
            let value = ((n - df + 0.5) / (df + 0.5)).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.clone());
            }
            idf.insert(term.clone(), value);
        }
        if !idf.is_empty() {
            let floor = params.epsilon * (idf_sum / idf.len() as f32);
            for term in negative {
                idf.insert(term, floor);
            }
        }

        Self {
            params,
            postings,
            idf,
            doc_lengths,
            avg_doc_length,
        }
    }

    /// Score every chunk against the query tokens.
    ///
    /// Repeated query tokens contribute once per occurrence. Unknown tokens
    /// contribute nothing.
    pub fn score<S: AsRef<str>>(&self, query_tokens: &[S]) -> Vec<f32> {
        let mut scores = vec![0.0f32; self.doc_lengths.len()];
        let Bm25Params { k1, b, .. } = self.params;
        let avgdl = if self.avg_doc_length > 0.0 {
            self.avg_doc_length
        } else {
            1.0
        };

        for token in query_tokens {
            let token = token.as_ref();
            let (Some(postings), Some(&idf)) = (self.postings.get(token), self.idf.get(token))
            else {
                continue;
            };
            for &(id, tf) in postings {
                let dl = self.doc_lengths[id];
                let numerator = tf * (k1 + 1.0);
                let denominator = tf + k1 * (1.0 - b + b * dl / avgdl);
                scores[id] += idf * numerator / denominator;
            }
        }
        scores
    }

    /// The `k` highest-scoring chunks, descending, ties by lower chunk id.
    ///
    /// Ranking covers the whole corpus, so chunks that share no token with
    /// the query can still appear (with score `0.0`) when `k` exceeds the
    /// number of matches.
    pub fn top_k<S: AsRef<str>>(&self, query_tokens: &[S], k: usize) -> Vec<(ChunkId, f32)> {
        let mut ranked: Vec<(ChunkId, f32)> =
            self.score(query_tokens).into_iter().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);
        ranked
    }

    /// Number of chunks the index was fitted on.
    pub fn document_count(&self) -> usize {
        self.doc_lengths.len()
    }

    /// Parameters the index was fitted with.
    pub fn params(&self) -> Bm25Params {
        self.params
    }

    /// Idf of a term, if it occurs in the corpus.
    pub fn idf(&self, term: &str) -> Option<f32> {
        self.idf.get(term).copied()
    }

    /// Check the internal tables agree with each other.
    ///
    /// A fitted index always passes. A deserialized one may not, and
    /// [`Bm25Index::score`] indexes by posting id without bounds checks, so
    /// loaders call this before serving.
    pub fn validate(&self) -> CasefileResult<()> {
        let corrupt = |msg: String| -> CasefileResult<()> { Err(CasefileError::CorruptIndex(msg)) };
        let docs = self.doc_lengths.len();

        if self.doc_lengths.iter().any(|l| !l.is_finite() || *l < 0.0) {
            return corrupt("Lexical index has an invalid document length".into());
        }
        if !self.avg_doc_length.is_finite() || self.avg_doc_length < 0.0 {
            return corrupt(format!(
                "Lexical index has invalid average document length {}",
                self.avg_doc_length
            ));
        }
        for (term, postings) in &self.postings {
            if !self.idf.contains_key(term) {
                return corrupt(format!("Lexical term '{term}' has postings but no idf"));
            }
            if let Some((id, _)) = postings.iter().find(|(id, _)| *id >= docs) {
                return corrupt(format!(
                    "Lexical term '{term}' points at chunk {id}, index holds {docs}"
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn corpus() -> Vec<&'static str> {
        vec![
            "rust is a systems programming language rust is fast rust is safe",
            "python is a scripting programming language used for data science",
            "cooking recipes for a delicious dinner meal",
        ]
    }

    #[test]
    fn test_fit_and_search_finds_document() {
        let index = Bm25Index::fit(&["the quick brown fox jumps over the lazy dog", "other"]);
        let results = index.top_k(&tokenize("quick brown fox"), 1);
        assert_eq!(results[0].0, 0);
        assert!(results[0].1 > 0.0, "score should be positive");
    }

    #[test]
    fn test_multiple_documents_ranked_correctly() {
        let index = Bm25Index::fit(&corpus());
        let results = index.top_k(&tokenize("rust programming"), 3);

        assert_eq!(results[0].0, 0, "document with both terms should rank first");
        assert_eq!(results[1].0, 1, "partial match should rank second");
        assert!(results[0].1 > results[1].1);
        assert_eq!(results[2].1, 0.0, "unrelated document scores zero");
    }

    #[test]
    fn test_score_covers_every_chunk() {
        let index = Bm25Index::fit(&corpus());
        let scores = index.score(&tokenize("dinner"));
        assert_eq!(scores.len(), 3);
        assert_eq!(scores[0], 0.0);
        assert!(scores[2] > 0.0);
    }

    #[test]
    fn test_top_k_includes_zero_score_chunks() {
        let index = Bm25Index::fit(&corpus());
        let results = index.top_k(&tokenize("nonexistent"), 10);
        assert_eq!(results.len(), 3);
        let ids: Vec<ChunkId> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 1, 2], "all-zero ties break by lower id");
    }

    #[test]
    fn test_idf_formula() {
        // "dinner" occurs in 1 of 3 documents: ln((3 - 1 + 0.5) / (1 + 0.5))
        let index = Bm25Index::fit(&corpus());
        let expected = (2.5f32 / 1.5).ln();
        assert!((index.idf("dinner").unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_negative_idf_is_floored_by_epsilon() {
        // "a" occurs in all 3 documents: raw idf = ln(0.5 / 3.5) < 0
        let index = Bm25Index::fit(&corpus());
        let a = index.idf("a").unwrap();
        assert!(a > 0.0, "negative idf should be replaced, got {a}");
        assert!(a < index.idf("dinner").unwrap());
    }

    #[test]
    fn test_repeated_query_tokens_count_twice() {
        let index = Bm25Index::fit(&corpus());
        let once = index.score(&tokenize("dinner"))[2];
        let twice = index.score(&tokenize("dinner dinner"))[2];
        assert!((twice - 2.0 * once).abs() < 1e-6);
    }

    #[test]
    fn test_tokenize_lowercases_and_splits_on_whitespace() {
        let tokens = tokenize("Claim  1.\tThe APPARATUS");
        assert_eq!(tokens, vec!["claim", "1.", "the", "apparatus"]);
    }

    #[test]
    fn test_empty_corpus() {
        let index = Bm25Index::fit::<&str>(&[]);
        assert_eq!(index.document_count(), 0);
        assert!(index.top_k(&tokenize("anything"), 5).is_empty());
    }

    #[test]
    fn test_fitted_index_validates() {
        assert!(Bm25Index::fit(&corpus()).validate().is_ok());
        assert!(Bm25Index::fit::<&str>(&[]).validate().is_ok());
    }

    #[test]
    fn test_posting_past_last_chunk_is_corrupt() {
        let mut index = Bm25Index::fit(&corpus());
        index.postings.insert("dinner".into(), vec![(7, 1.0)]);
        let err = index.validate().unwrap_err();
        assert!(matches!(err, CasefileError::CorruptIndex(_)));
        assert!(err.to_string().contains("chunk 7"));
    }

    #[test]
    fn test_posting_without_idf_is_corrupt() {
        let mut index = Bm25Index::fit(&corpus());
        index.postings.insert("reissue".into(), vec![(0, 1.0)]);
        assert!(matches!(index.validate(), Err(CasefileError::CorruptIndex(_))));
    }

    #[test]
    fn test_serde_roundtrip_preserves_scores() {
        let index = Bm25Index::fit(&corpus());
        let json = serde_json::to_string(&index).unwrap();
        let back: Bm25Index = serde_json::from_str(&json).unwrap();
        let q = tokenize("programming language");
        assert_eq!(index.score(&q), back.score(&q));
    }
}
