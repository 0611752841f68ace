//! Reconciling two versions of the same metadata record.
//!
//! Classification looks at which fields differ, highest priority first:
//!
//! | class        | fields                                            | resolution          |
//! |--------------|---------------------------------------------------|---------------------|
//! | `Structural` | `translations`, `extends`, `origin`               | per policy          |
//! | `Movement`   | only `x` / `y`                                    | `Visual`            |
//! | `MetaComment`| anything else (`tags`, `links`, `ai`, `extras`...)| `Merge`             |
//!
//! Resolution never depends on anything but its arguments.

use chrono::{DateTime, Utc};
use duplex_meta::VisualMeta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictType {
    Structural,
    Movement,
    MetaComment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionOption {
    /// Keep the stored (text-side) record
    Text,
    /// Keep the proposed (visual-side) record
    Visual,
    /// Take the proposed record, unioning `tags` and `links`
    Merge,
}

/// Tie-break for structural conflicts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionPolicy {
    #[default]
    PreferText,
    PreferVisual,
}

/// Both sides of a conflict and how it was settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: String,
    pub old: VisualMeta,
    pub new: VisualMeta,
    pub conflict_type: ConflictType,
    pub resolution: ResolutionOption,
}

pub fn classify(old: &VisualMeta, new: &VisualMeta) -> ConflictType {
    if old.translations != new.translations || old.extends != new.extends || old.origin != new.origin {
        return ConflictType::Structural;
    }

    let moved = old.x != new.x || old.y != new.y;
    let annotations_equal = old.tags == new.tags
        && old.links == new.links
        && old.anchors == new.anchors
        && old.tests == new.tests
        && old.ai == new.ai
        && old.extras == new.extras
        && old.unknown == new.unknown;

    if moved && annotations_equal {
        ConflictType::Movement
    } else {
        ConflictType::MetaComment
    }
}

pub fn resolution_for(conflict_type: ConflictType, policy: ResolutionPolicy) -> ResolutionOption {
    match conflict_type {
        ConflictType::Structural => match policy {
            ResolutionPolicy::PreferText => ResolutionOption::Text,
            ResolutionPolicy::PreferVisual => ResolutionOption::Visual,
        },
        ConflictType::Movement => ResolutionOption::Visual,
        ConflictType::MetaComment => ResolutionOption::Merge,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    policy: ResolutionPolicy,
}

impl ConflictResolver {
    pub fn new(policy: ResolutionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    /// Resolve, stamping the result with the current time
    pub fn resolve(&self, old: &VisualMeta, new: &VisualMeta) -> (VisualMeta, ConflictRecord) {
        self.resolve_at(old, new, Utc::now())
    }

    pub fn resolve_at(
        &self,
        old: &VisualMeta,
        new: &VisualMeta,
        now: DateTime<Utc>,
    ) -> (VisualMeta, ConflictRecord) {
        let conflict_type = classify(old, new);
        let resolution = resolution_for(conflict_type, self.policy);

        let mut resolved = match resolution {
            ResolutionOption::Text => old.clone(),
            ResolutionOption::Visual => new.clone(),
            ResolutionOption::Merge => merge(old, new),
        };
        resolved.id = old.id.clone();
        resolved.version = old.version.max(new.version) + 1;
        resolved.updated_at = now;

        let record = ConflictRecord {
            id: old.id.clone(),
            old: old.clone(),
            new: new.clone(),
            conflict_type,
            resolution,
        };

        (resolved, record)
    }
}

/// `resolve_at` as a free function of its inputs
pub fn resolve_at(
    old: &VisualMeta,
    new: &VisualMeta,
    policy: ResolutionPolicy,
    now: DateTime<Utc>,
) -> (VisualMeta, ConflictRecord) {
    ConflictResolver::new(policy).resolve_at(old, new, now)
}

fn merge(old: &VisualMeta, new: &VisualMeta) -> VisualMeta {
    let mut merged = new.clone();
    merged.tags = old.tags.union(&new.tags).cloned().collect();

    let mut links = old.links.clone();
    for link in &new.links {
        if !links.contains(link) {
            links.push(link.clone());
        }
    }
    merged.links = links;

    merged
}
