use async_trait::async_trait;
use casefile_core::CasefileResult;
use regex::Regex;
use std::sync::LazyLock;

/// Produces alternative phrasings of a query to improve recall.
///
/// The returned list starts with the original query. Later elements are
/// searched with half weight during fusion.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    /// Expand `query` into at most `max_expansions` variants, original included.
    async fn expand(&self, query: &str, max_expansions: usize) -> CasefileResult<Vec<String>>;
}

/// Offline expander that appends hypothetical answer passages for common
/// patent-law topics, chosen by keyword triggers in the query.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedExpander;

impl RuleBasedExpander {
    /// Create a new expander.
    pub fn new() -> Self {
        Self
    }

    /// Every hypothetical passage the query triggers, in a fixed topic order.
    /// Falls back to one generic passage when nothing matches.
    pub fn passages(&self, query: &str) -> Vec<String> {
        let q = query.to_lowercase();
        let mut out: Vec<String> = Vec::new();
        let mut push = |text: &str| out.push(text.to_string());

        if contains_any(&q, &["claim", "claims"]) {
            if contains_any(&q, &["definite", "definiteness"]) {
                push(CLAIM_DEFINITENESS);
            }
            if contains_any(&q, &["format", "structure"]) {
                push(CLAIM_FORMAT);
            }
            if contains_any(&q, &["antecedent", "basis"]) {
                push(ANTECEDENT_BASIS);
            }
            if q.contains("dependent") {
                push(DEPENDENT_CLAIMS);
            }
        }

        if contains_any(&q, &["specification", "spec", "description"]) {
            if contains_any(&q, &["written description", "112(a)"]) {
                push(WRITTEN_DESCRIPTION);
            }
            if contains_any(&q, &["enable", "enablement"]) {
                push(ENABLEMENT);
            }
            if q.contains("best mode") {
                push(BEST_MODE);
            }
        }

        if contains_any(&q, &["abstract", "drawing", "formality", "formal"]) {
            if q.contains("abstract") {
                push(ABSTRACT);
            }
            if q.contains("drawing") {
                push(DRAWINGS);
            }
        }

        if STATUTE_CITATION.as_ref().is_some_and(|re| re.is_match(&q)) || q.contains("statute") {
            if contains_any(&q, &["101", "eligible"]) {
                push(USC_101);
            }
            if contains_any(&q, &["102", "novelty"]) {
                push(USC_102);
            }
            if contains_any(&q, &["103", "obvious"]) {
                push(USC_103);
            }
        }

        if out.is_empty() {
            out.push(format!(
                "In patent law and the MPEP manual, regarding {query}, the relevant statutory and \
                 regulatory provisions establish specific requirements and procedures that must be \
                 followed for patent prosecution and examination."
            ));
        }
        out
    }
}

#[async_trait]
impl QueryExpander for RuleBasedExpander {
    async fn expand(&self, query: &str, max_expansions: usize) -> CasefileResult<Vec<String>> {
        let mut variants = vec![query.to_string()];
        variants.extend(
            self.passages(query)
                .into_iter()
                .take(max_expansions.saturating_sub(1)),
        );
        Ok(variants)
    }
}

/// Make expander output safe to fuse: the original query first, no variant
/// repeated, at most `max_expansions` entries, never empty.
///
/// A repeated variant would be fused twice and outweigh the others.
pub fn normalize_variants(query: &str, variants: Vec<String>, max_expansions: usize) -> Vec<String> {
    let limit = max_expansions.max(1);
    let mut out = Vec::with_capacity(limit.min(variants.len() + 1));
    out.push(query.to_string());
    for variant in variants {
        if out.len() >= limit {
            break;
        }
        if !out.contains(&variant) {
            out.push(variant);
        }
    }
    out
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

static STATUTE_CITATION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"35\s*u\.?s\.?c\.?\s*§?\s*\d+").ok());

const CLAIM_DEFINITENESS: &str = "Under 35 USC 112(b), patent claims must be definite and particularly point out \
and distinctly claim the subject matter of the invention. The claim language must be sufficiently clear and \
precise to inform those skilled in the art of the scope of the claimed invention with reasonable certainty.";

const CLAIM_FORMAT: &str = "Patent claims must be in the form of a single sentence beginning with a capital \
letter and ending with a period. Each claim should include a preamble stating the general nature of the \
invention, a transitional phrase, and a body that describes the specific elements and limitations of the \
claimed invention.";

const ANTECEDENT_BASIS: &str = "Proper antecedent basis requires that each element referred to using 'the' or \
'said' must have been previously introduced in the claim using 'a' or 'an'. This ensures clarity and \
definiteness in claim language and prevents ambiguity about which elements are being referenced.";

const DEPENDENT_CLAIMS: &str = "A dependent claim refers back to and further limits a previous claim. Dependent \
claims incorporate all limitations of the claim to which they refer and must be construed to include all those \
limitations. The doctrine of claim differentiation presumes different scope between independent and dependent \
claims.";

const WRITTEN_DESCRIPTION: &str = "The written description requirement under 35 USC 112(a) mandates that the \
specification must describe the invention in sufficient detail to show that the inventor possessed the claimed \
invention at the time of filing. The description must convey with reasonable clarity to those skilled in the art \
that the inventor possessed the claimed invention.";

const ENABLEMENT: &str = "Under 35 USC 112(a), the specification must enable a person skilled in the art to make \
and use the full scope of the claimed invention without undue experimentation. The enablement requirement \
ensures that the public receives meaningful disclosure in exchange for the patent monopoly.";

const BEST_MODE: &str = "The best mode requirement under 35 USC 112(a) required disclosure of the best way the \
inventor knew to practice the invention at the time of filing. Under the America Invents Act, failure to \
disclose best mode is no longer a basis for invalidity, though the requirement to disclose still exists.";

const ABSTRACT: &str = "The abstract must be a brief summary of the technical disclosure, preferably 150 words or \
less. It should enable the USPTO and the public to quickly determine the nature and gist of the technical \
disclosure. The abstract is not used for interpreting the scope of claim protection.";

const DRAWINGS: &str = "Patent drawings must show every feature of the invention specified in the claims. \
Drawings must be in a particular form and follow specific rules regarding margins, views, symbols, legends, and \
arrangement. Design patent drawings are subject to additional requirements regarding shading and surface \
characteristics.";

const USC_101: &str = "35 USC 101 defines patent-eligible subject matter: processes, machines, manufactures, and \
compositions of matter. Abstract ideas, laws of nature, and natural phenomena are not patentable. The Alice/Mayo \
framework evaluates whether claims are directed to patent-eligible subject matter or merely abstract ideas with \
conventional implementation.";

const USC_102: &str = "35 USC 102 defines conditions for patentability relating to novelty. A patent may not be \
obtained if the invention was known or used by others, patented, described in a printed publication, or \
otherwise available to the public before the effective filing date of the claimed invention.";

const USC_103: &str = "35 USC 103 prohibits patents on inventions that would have been obvious to a person having \
ordinary skill in the art at the time of invention. The Graham factors consider the scope and content of prior \
art, differences between prior art and claims, level of ordinary skill, and secondary considerations like \
commercial success.";
