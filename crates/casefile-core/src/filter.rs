//! Metadata predicates applied to fused candidates before reranking.

use crate::metadata::{ChunkMetadata, SourceKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A predicate over [`ChunkMetadata`].
///
/// Filters are plain data so they can be passed in from the CLI or a config
/// file as JSON, e.g. `{"op":"source","sources":["MPEP","35_USC"]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MetadataFilter {
    /// Source is one of the listed kinds.
    Source {
        /// Accepted sources.
        sources: Vec<SourceKind>,
    },
    /// A boolean field has the given value. Missing fields read as `false`.
    Flag {
        /// Field name, typed or extra.
        field: String,
        /// Expected value.
        value: bool,
    },
    /// A field equals the given JSON value.
    Eq {
        /// Field name, typed or extra.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// A string field, or any element of a string-array field, starts with `prefix`.
    Prefix {
        /// Field name, typed or extra.
        field: String,
        /// Required prefix.
        prefix: String,
    },
    /// A date field lies within an inclusive range. Dates compare as
    /// `YYYYMMDD` after stripping `-`. Chunks without the field are excluded.
    DateRange {
        /// Field name holding the date.
        field: String,
        /// Inclusive lower bound.
        #[serde(default)]
        start: Option<String>,
        /// Inclusive upper bound.
        #[serde(default)]
        end: Option<String>,
    },
    /// Every inner filter matches.
    All {
        /// Inner filters.
        filters: Vec<MetadataFilter>,
    },
    /// At least one inner filter matches.
    Any {
        /// Inner filters.
        filters: Vec<MetadataFilter>,
    },
    /// The inner filter does not match.
    Not {
        /// Negated filter.
        filter: Box<MetadataFilter>,
    },
}

impl MetadataFilter {
    /// Match chunks from any of the given sources.
    pub fn source<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SourceKind>,
    {
        MetadataFilter::Source {
            sources: sources.into_iter().map(Into::into).collect(),
        }
    }

    /// Match chunks where a boolean field equals `value`.
    pub fn flag(field: impl Into<String>, value: bool) -> Self {
        MetadataFilter::Flag {
            field: field.into(),
            value,
        }
    }

    /// Match chunks where a field equals `value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        MetadataFilter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Match chunks where a string (or string-array) field starts with `prefix`.
    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        MetadataFilter::Prefix {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    /// Match chunks whose date field lies in `[start, end]`.
    pub fn date_range(
        field: impl Into<String>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Self {
        MetadataFilter::DateRange {
            field: field.into(),
            start: start.map(str::to_string),
            end: end.map(str::to_string),
        }
    }

    /// Conjunction.
    pub fn all(filters: Vec<MetadataFilter>) -> Self {
        MetadataFilter::All { filters }
    }

    /// Disjunction.
    pub fn any(filters: Vec<MetadataFilter>) -> Self {
        MetadataFilter::Any { filters }
    }

    /// Negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: MetadataFilter) -> Self {
        MetadataFilter::Not {
            filter: Box::new(filter),
        }
    }

    /// Evaluate the predicate against one chunk's metadata.
    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        match self {
            MetadataFilter::Source { sources } => sources.contains(&meta.source),
            MetadataFilter::Flag { field, value } => meta.flag(field) == *value,
            MetadataFilter::Eq { field, value } => meta.field(field).as_ref() == Some(value),
            MetadataFilter::Prefix { field, prefix } => match meta.field(field) {
                Some(Value::String(s)) => s.starts_with(prefix.as_str()),
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|s| s.starts_with(prefix.as_str())),
                _ => false,
            },
            MetadataFilter::DateRange { field, start, end } => {
                let date = match meta.field(field) {
                    Some(Value::String(s)) => compact_date(&s),
                    _ => return false,
                };
                let after_start = start.as_deref().map_or(true, |s| date >= compact_date(s));
                let before_end = end.as_deref().map_or(true, |e| date <= compact_date(e));
                after_start && before_end
            }
            MetadataFilter::All { filters } => filters.iter().all(|f| f.matches(meta)),
            MetadataFilter::Any { filters } => filters.iter().any(|f| f.matches(meta)),
            MetadataFilter::Not { filter } => !filter.matches(meta),
        }
    }
}

fn compact_date(date: &str) -> String {
    date.replace('-', "")
}
