//! The metadata record embedded in source comments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_VERSION: u64 = 1;

fn default_version() -> u64 {
    DEFAULT_VERSION
}

/// Free-form annotation attached to a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiNote {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hints: Vec<String>,
}

/// Versioned metadata for one visual node
///
/// Empty collections and absent optionals are left out of the serialized
/// payload and restored as defaults on read. Keys this version does not know
/// about are kept in `unknown` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualMeta {
    #[serde(default = "default_version")]
    pub version: u64,

    pub id: String,

    #[serde(default)]
    pub x: f64,

    #[serde(default)]
    pub y: f64,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    /// Edges to other nodes, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anchors: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<String>,

    /// Id of the record this one inherits from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    /// Path of the external file this node was copied from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub translations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai: Option<AiNote>,

    /// Owned by external collaborators, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<Map<String, Value>>,

    #[serde(default)]
    pub updated_at: DateTime<Utc>,

    #[serde(flatten)]
    pub unknown: Map<String, Value>,
}

impl VisualMeta {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            version: DEFAULT_VERSION,
            id: id.into(),
            x,
            y,
            tags: BTreeSet::new(),
            links: Vec::new(),
            anchors: Vec::new(),
            tests: Vec::new(),
            extends: None,
            origin: None,
            translations: BTreeMap::new(),
            ai: None,
            extras: None,
            updated_at: DateTime::<Utc>::default(),
            unknown: Map::new(),
        }
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_link(mut self, id: impl Into<String>) -> Self {
        self.links.push(id.into());
        self
    }

    pub fn with_anchor(mut self, name: impl Into<String>) -> Self {
        self.anchors.push(name.into());
        self
    }

    pub fn with_translation(mut self, locale: impl Into<String>, text: impl Into<String>) -> Self {
        self.translations.insert(locale.into(), text.into());
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// Equal in every field except `updated_at`
    pub fn same_content(&self, other: &VisualMeta) -> bool {
        let mut other = other.clone();
        other.updated_at = self.updated_at;
        *self == other
    }

    pub fn has_finite_position(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_on_minimal_payload() {
        let meta: VisualMeta = serde_json::from_str(r#"{"id":"a"}"#).unwrap();
        assert_eq!(meta.version, 1);
        assert_eq!(meta.x, 0.0);
        assert!(meta.tags.is_empty());
        assert_eq!(meta.updated_at, DateTime::<Utc>::default());
        assert!(meta.unknown.is_empty());
    }

    #[test]
    fn test_full_payload() {
        let json = r#"{
            "version": 1, "id": "a", "x": 0.0, "y": 0.0,
            "tags": ["demo"], "links": ["b"], "anchors": ["start"],
            "tests": ["cmd"], "extends": null, "origin": null,
            "translations": { "en": "label" },
            "ai": { "description": "...", "hints": ["..."] },
            "extras": { "plugin": {} },
            "updated_at": "2024-01-01T00:00:00Z"
        }"#;
        let meta: VisualMeta = serde_json::from_str(json).unwrap();
        assert!(meta.tags.contains("demo"));
        assert_eq!(meta.links, vec!["b"]);
        assert_eq!(meta.translations.get("en").map(String::as_str), Some("label"));
        assert_eq!(meta.ai.as_ref().map(|a| a.hints.len()), Some(1));
        assert!(meta.extras.as_ref().unwrap().contains_key("plugin"));
        assert_eq!(meta.updated_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert!(meta.unknown.is_empty());
    }

    #[test]
    fn test_unknown_keys_round_trip() {
        let json = r#"{"id":"a","x":1.0,"y":2.0,"color":"red","z":{"depth":3}}"#;
        let meta: VisualMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.unknown.get("color"), Some(&Value::from("red")));

        let encoded = serde_json::to_string(&meta).unwrap();
        let decoded: VisualMeta = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, meta);
        assert!(encoded.contains(r#""z":{"depth":3}"#));
    }

    #[test]
    fn test_same_content_ignores_timestamp() {
        let a = VisualMeta::new("a", 1.0, 2.0);
        let b = a.clone().with_updated_at(Utc::now());
        assert!(a.same_content(&b));
        assert!(!a.same_content(&b.with_tag("x")));
    }
}
