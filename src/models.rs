//! Core data models for the retrieval engine.
//!
//! These types represent the fragments, metadata, and search results that
//! flow through the store, ranker, and facade.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Which physical collection a fragment lives in.
///
/// Fragments never move between collections implicitly; visibility is
/// fixed at insertion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(format!(
                "unknown visibility: '{}'. Use public or private.",
                other
            )),
        }
    }
}

/// Which collections a search should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Public,
    Private,
    Both,
}

impl Scope {
    /// Collections covered by this scope, in deterministic merge order.
    pub fn visibilities(&self) -> &'static [Visibility] {
        match self {
            Scope::Public => &[Visibility::Public],
            Scope::Private => &[Visibility::Private],
            Scope::Both => &[Visibility::Public, Visibility::Private],
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Scope::Public),
            "private" => Ok(Scope::Private),
            "both" => Ok(Scope::Both),
            other => Err(format!(
                "unknown scope: '{}'. Use public, private, or both.",
                other
            )),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scope::Public => "public",
            Scope::Private => "private",
            Scope::Both => "both",
        })
    }
}

/// Structured fragment annotations.
///
/// Well-known fields cover the common cases (tags, category, session
/// provenance); everything else goes into the open `extra` bag so the
/// storage schema stays stable while callers can still annotate ad hoc.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Identifier of the chat/session that produced this fragment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl FragmentMetadata {
    pub fn with_category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Default::default()
        }
    }
}

/// A stored unit of knowledge: text plus its embedding and annotations.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Opaque identifier, unique within a collection.
    pub id: String,
    /// Normalized text content (non-empty).
    pub content: String,
    /// SHA-256 of the normalized content; unique per collection.
    pub content_hash: String,
    /// Dense vector computed once at insertion time.
    pub embedding: Vec<f32>,
    pub metadata: FragmentMetadata,
    /// Unix timestamp of first insertion.
    pub added_at: i64,
}

/// A search hit: fragment content, fused relevance score, and provenance.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub fragment_id: String,
    pub content: String,
    /// Fused RRF score; higher is more relevant.
    pub score: f64,
    /// Originating collection, always populated so callers can tell
    /// provenance apart even when searching both collections.
    pub source: Visibility,
}

/// Per-collection statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub fragments: i64,
    pub newest_added_at: Option<i64>,
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_visibilities() {
        assert_eq!(Scope::Public.visibilities(), &[Visibility::Public]);
        assert_eq!(Scope::Private.visibilities(), &[Visibility::Private]);
        assert_eq!(
            Scope::Both.visibilities(),
            &[Visibility::Public, Visibility::Private]
        );
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!("both".parse::<Scope>().unwrap(), Scope::Both);
        assert!("everything".parse::<Scope>().is_err());
    }

    #[test]
    fn test_metadata_json_roundtrip() {
        let mut meta = FragmentMetadata {
            tags: vec!["pattern".to_string()],
            category: Some("ai-note".to_string()),
            session_id: Some("s-42".to_string()),
            extra: BTreeMap::new(),
        };
        meta.extra.insert("origin".to_string(), "chat".to_string());

        let json = serde_json::to_string(&meta).unwrap();
        let back: FragmentMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, back);
    }

    #[test]
    fn test_metadata_default_is_empty_object() {
        let json = serde_json::to_string(&FragmentMetadata::default()).unwrap();
        assert_eq!(json, "{}");
        let back: FragmentMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(back, FragmentMetadata::default());
    }
}
