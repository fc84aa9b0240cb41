//! Raw change deltas: what a working view changed relative to its base.
//!
//! The delta is computed by comparing the view's base graph with its working
//! graph. Objects are classified by reachability from the root:
//!
//! - reachable in the working graph but absent from the base: new
//! - present in the base but no longer reachable: detached
//! - present in both with different content: revised, with per-feature deltas
//!
//! Many-valued features are diffed as ordered identity sets and reported as
//! removals (highest index first), then additions, then moves. Replaying the
//! deltas in order against the old list yields the new list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use folio_types::{FeatureValue, Oid, Schema, Value};

use crate::object::{Containment, Graph, ObjectRecord};

/// One change to one feature of a pre-existing object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureDelta {
    /// A single-valued feature received a value.
    Set {
        feature: String,
        old: Option<Value>,
        new: Value,
    },
    /// A single-valued feature lost its value.
    Unset { feature: String, old: Value },
    /// A value was inserted into a many-valued feature.
    Add {
        feature: String,
        index: usize,
        value: Value,
    },
    /// A value was removed from a many-valued feature.
    Remove {
        feature: String,
        index: usize,
        value: Value,
    },
    /// A value changed position within a many-valued feature.
    Move {
        feature: String,
        from: usize,
        to: usize,
        value: Value,
    },
}

impl FeatureDelta {
    /// Name of the feature this delta applies to.
    pub fn feature(&self) -> &str {
        match self {
            Self::Set { feature, .. }
            | Self::Unset { feature, .. }
            | Self::Add { feature, .. }
            | Self::Remove { feature, .. }
            | Self::Move { feature, .. } => feature,
        }
    }
}

/// An object that became reachable in this view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewObject {
    pub oid: Oid,
    pub class: String,
    pub container: Option<Containment>,
    pub features: BTreeMap<String, FeatureValue>,
}

/// A committed object that is no longer reachable in this view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedObject {
    pub oid: Oid,
    pub class: String,
    /// Committed version seen when the view was opened.
    pub version: u64,
}

/// Feature-level changes to a committed object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionDelta {
    pub oid: Oid,
    pub class: String,
    /// Committed version seen when the view was opened.
    pub version: u64,
    /// The object moved to another container.
    pub container_changed: bool,
    pub deltas: Vec<FeatureDelta>,
}

/// Everything a working view changed, ordered by ascending [`Oid`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDelta {
    pub new_objects: Vec<NewObject>,
    pub detached: Vec<DetachedObject>,
    pub revisions: Vec<RevisionDelta>,
}

impl RawDelta {
    /// Returns `true` if the view changed nothing reachable.
    pub fn is_empty(&self) -> bool {
        self.new_objects.is_empty() && self.detached.is_empty() && self.revisions.is_empty()
    }

    /// Total number of feature deltas across all revisions.
    pub fn feature_delta_count(&self) -> usize {
        self.revisions.iter().map(|r| r.deltas.len()).sum()
    }
}

/// Compute the delta between a base graph and a working graph.
pub(crate) fn compute(schema: &Schema, base: &Graph, work: &Graph) -> RawDelta {
    let live = work.live_set(schema);
    let mut delta = RawDelta::default();

    for oid in &live {
        let Some(record) = work.get(*oid) else {
            continue;
        };
        match base.get(*oid) {
            None => delta.new_objects.push(NewObject {
                oid: record.oid,
                class: record.class.clone(),
                container: record.container.clone(),
                features: record.features.clone(),
            }),
            Some(old) if old != record => {
                let deltas = diff_records(schema, old, record);
                let container_changed = old.container != record.container;
                if !deltas.is_empty() || container_changed {
                    delta.revisions.push(RevisionDelta {
                        oid: record.oid,
                        class: record.class.clone(),
                        version: old.version,
                        container_changed,
                        deltas,
                    });
                }
            }
            Some(_) => {}
        }
    }

    for old in base.records() {
        if !live.contains(&old.oid) {
            delta.detached.push(DetachedObject {
                oid: old.oid,
                class: old.class.clone(),
                version: old.version,
            });
        }
    }

    delta
}

/// Diff two versions of the same object feature by feature.
///
/// Features are visited in schema declaration order (inherited first);
/// features the schema does not know follow in name order.
pub fn diff_records(schema: &Schema, old: &ObjectRecord, new: &ObjectRecord) -> Vec<FeatureDelta> {
    let mut names: Vec<&str> = schema
        .features_of(&new.class)
        .map(|defs| defs.into_iter().map(|d| d.name.as_str()).collect())
        .unwrap_or_default();
    for key in old.features.keys().chain(new.features.keys()) {
        if !names.contains(&key.as_str()) {
            names.push(key.as_str());
        }
    }

    let mut out = Vec::new();
    for name in names {
        match (old.features.get(name), new.features.get(name)) {
            (Some(FeatureValue::Many(a)), Some(FeatureValue::Many(b))) => {
                out.extend(diff_list(name, a, b));
            }
            (None, Some(FeatureValue::Many(b))) => out.extend(diff_list(name, &[], b)),
            (Some(FeatureValue::Many(a)), None) => out.extend(diff_list(name, a, &[])),
            (None, Some(FeatureValue::Single(v))) => out.push(FeatureDelta::Set {
                feature: name.to_string(),
                old: None,
                new: v.clone(),
            }),
            (Some(FeatureValue::Single(a)), Some(FeatureValue::Single(b))) if a != b => {
                out.push(FeatureDelta::Set {
                    feature: name.to_string(),
                    old: Some(a.clone()),
                    new: b.clone(),
                });
            }
            (Some(FeatureValue::Single(a)), None) => out.push(FeatureDelta::Unset {
                feature: name.to_string(),
                old: a.clone(),
            }),
            _ => {}
        }
    }
    out
}

/// Diff two lists treated as ordered identity sets.
pub fn diff_list(feature: &str, old: &[Value], new: &[Value]) -> Vec<FeatureDelta> {
    let mut out = Vec::new();
    let mut current: Vec<Value> = old.to_vec();

    for index in (0..current.len()).rev() {
        if !new.contains(&current[index]) {
            let value = current.remove(index);
            out.push(FeatureDelta::Remove {
                feature: feature.to_string(),
                index,
                value,
            });
        }
    }

    for (pos, value) in new.iter().enumerate() {
        if !current.contains(value) {
            let index = pos.min(current.len());
            current.insert(index, value.clone());
            out.push(FeatureDelta::Add {
                feature: feature.to_string(),
                index,
                value: value.clone(),
            });
        }
    }

    for (to, value) in new.iter().enumerate() {
        if current.get(to) == Some(value) {
            continue;
        }
        if let Some(from) = current.iter().position(|v| v == value) {
            let moved = current.remove(from);
            current.insert(to, moved);
            out.push(FeatureDelta::Move {
                feature: feature.to_string(),
                from,
                to,
                value: value.clone(),
            });
        }
    }

    out
}
