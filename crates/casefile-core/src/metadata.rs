use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin of a chunk within the corpus.
///
/// Known origins get their own variant; anything else is kept verbatim in
/// [`SourceKind::Other`] so that foreign corpora round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceKind {
    /// The examination manual itself.
    Mpep,
    /// Title 35 of the United States Code.
    Usc35,
    /// Title 37 of the Code of Federal Regulations.
    Cfr37,
    /// Updates published after the manual revision.
    Subsequent,
    /// Granted patents or published applications.
    Patent,
    /// Any other origin label.
    Other(String),
}

impl SourceKind {
    /// Canonical wire label for this source.
    pub fn as_str(&self) -> &str {
        match self {
            SourceKind::Mpep => "MPEP",
            SourceKind::Usc35 => "35_USC",
            SourceKind::Cfr37 => "37_CFR",
            SourceKind::Subsequent => "SUBSEQUENT",
            SourceKind::Patent => "PATENT",
            SourceKind::Other(s) => s,
        }
    }
}

impl From<String> for SourceKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "MPEP" => SourceKind::Mpep,
            "35_USC" => SourceKind::Usc35,
            "37_CFR" => SourceKind::Cfr37,
            "SUBSEQUENT" => SourceKind::Subsequent,
            "PATENT" => SourceKind::Patent,
            _ => SourceKind::Other(s),
        }
    }
}

impl From<&str> for SourceKind {
    fn from(s: &str) -> Self {
        SourceKind::from(s.to_string())
    }
}

impl From<SourceKind> for String {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached 1:1 to a stored chunk.
///
/// The typed fields are the ones search filters rely on. Everything else
/// (page, file, dates, inventors, cross-reference flags...) lives in
/// `extra` and is carried through build, save and load untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Where the chunk came from.
    pub source: SourceKind,
    /// Section label, e.g. `"MPEP 2173"` or `"35 USC 112"`.
    pub section: String,
    /// The chunk is statutory text.
    #[serde(default)]
    pub is_statute: bool,
    /// The chunk is regulatory text.
    #[serde(default)]
    pub is_regulation: bool,
    /// The chunk comes from a post-revision update.
    #[serde(default)]
    pub is_update: bool,
    /// Opaque optional fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChunkMetadata {
    /// Create metadata with no flags set and no extra fields.
    pub fn new(source: impl Into<SourceKind>, section: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            section: section.into(),
            is_statute: false,
            is_regulation: false,
            is_update: false,
            extra: serde_json::Map::new(),
        }
    }

    /// Builder-style setter for an extra field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Set the classification flags from the source kind, the way the
    /// corpus loaders do for statutes, regulations and updates.
    pub fn with_source_flags(mut self) -> Self {
        self.is_statute = self.source == SourceKind::Usc35;
        self.is_regulation = self.source == SourceKind::Cfr37;
        self.is_update = self.source == SourceKind::Subsequent;
        self
    }

    /// Look up a field by name, covering both typed and extra fields.
    pub fn field(&self, name: &str) -> Option<serde_json::Value> {
        match name {
            "source" => Some(serde_json::Value::String(self.source.as_str().to_string())),
            "section" => Some(serde_json::Value::String(self.section.clone())),
            "is_statute" => Some(serde_json::Value::Bool(self.is_statute)),
            "is_regulation" => Some(serde_json::Value::Bool(self.is_regulation)),
            "is_update" => Some(serde_json::Value::Bool(self.is_update)),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Boolean value of a flag. Missing or non-boolean fields read as `false`.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.field(name), Some(serde_json::Value::Bool(true)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_known_labels() {
        assert_eq!(SourceKind::from("MPEP"), SourceKind::Mpep);
        assert_eq!(SourceKind::from("35_USC"), SourceKind::Usc35);
        assert_eq!(SourceKind::from("37_CFR").as_str(), "37_CFR");
    }

    #[test]
    fn test_unknown_source_preserved_verbatim() {
        let kind = SourceKind::from("EPO_GUIDELINES");
        assert_eq!(kind, SourceKind::Other("EPO_GUIDELINES".into()));
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, "\"EPO_GUIDELINES\"");
    }

    #[test]
    fn test_metadata_serde_flattens_extra() {
        let meta = ChunkMetadata::new("MPEP", "MPEP 2173")
            .with_field("page", 12)
            .with_field("has_usc_ref", true);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["source"], "MPEP");
        assert_eq!(json["page"], 12);
        assert_eq!(json["is_statute"], false);

        let back: ChunkMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_flags_default_to_false() {
        let meta: ChunkMetadata =
            serde_json::from_str(r#"{"source":"PATENT","section":"US123 - Claim 1"}"#).unwrap();
        assert!(!meta.is_statute);
        assert!(!meta.is_update);
        assert!(meta.extra.is_empty());
    }

    #[test]
    fn test_field_and_flag_lookup() {
        let meta = ChunkMetadata::new("35_USC", "35 USC 112")
            .with_source_flags()
            .with_field("has_mpep_ref", true);
        assert!(meta.flag("is_statute"));
        assert!(!meta.flag("is_regulation"));
        assert!(meta.flag("has_mpep_ref"));
        assert!(!meta.flag("missing"));
        assert_eq!(meta.field("section").unwrap(), "35 USC 112");
    }
}
