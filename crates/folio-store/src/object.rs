//! Stored object records and the graph that holds them.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use folio_types::{classes, features, FeatureValue, Oid, Schema, Value};

/// Where an object sits in the containment tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Containment {
    pub parent: Oid,
    pub feature: String,
}

/// One persisted object.
///
/// `version` is the committed version number: 0 for objects created in a
/// view that have never been committed, bumped by one on every commit that
/// modifies the record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub oid: Oid,
    pub class: String,
    pub container: Option<Containment>,
    pub features: BTreeMap<String, FeatureValue>,
    pub version: u64,
}

impl ObjectRecord {
    pub fn new(oid: Oid, class: impl Into<String>) -> Self {
        Self {
            oid,
            class: class.into(),
            container: None,
            features: BTreeMap::new(),
            version: 0,
        }
    }

    /// Text value of a single-valued feature.
    pub fn text(&self, feature: &str) -> Option<&str> {
        self.features
            .get(feature)
            .and_then(FeatureValue::as_single)
            .and_then(Value::as_text)
    }

    /// Every object this record references, across all features.
    pub fn referenced_oids(&self) -> impl Iterator<Item = Oid> + '_ {
        self.features
            .values()
            .flat_map(FeatureValue::values)
            .filter_map(Value::as_ref_oid)
    }
}

/// A set of object records keyed by [`Oid`].
///
/// Every graph contains the root resource. Objects are live when they can be
/// reached from the root through containment features.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    objects: BTreeMap<Oid, ObjectRecord>,
}

impl Graph {
    /// A graph holding only the root resource.
    pub fn with_root() -> Self {
        let mut root = ObjectRecord::new(Oid::ROOT, classes::RESOURCE);
        root.features
            .insert(features::CONTENTS.to_string(), FeatureValue::Many(Vec::new()));
        root.version = 1;
        let mut objects = BTreeMap::new();
        objects.insert(Oid::ROOT, root);
        Self { objects }
    }

    pub fn get(&self, oid: Oid) -> Option<&ObjectRecord> {
        self.objects.get(&oid)
    }

    pub fn get_mut(&mut self, oid: Oid) -> Option<&mut ObjectRecord> {
        self.objects.get_mut(&oid)
    }

    pub fn contains(&self, oid: Oid) -> bool {
        self.objects.contains_key(&oid)
    }

    pub fn insert(&mut self, record: ObjectRecord) {
        self.objects.insert(record.oid, record);
    }

    pub fn remove(&mut self, oid: Oid) -> Option<ObjectRecord> {
        self.objects.remove(&oid)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.objects.values()
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut ObjectRecord> {
        self.objects.values_mut()
    }

    /// Objects reachable from the root through containment features.
    pub fn live_set(&self, schema: &Schema) -> BTreeSet<Oid> {
        let mut live = BTreeSet::new();
        let mut queue = VecDeque::from([Oid::ROOT]);
        while let Some(oid) = queue.pop_front() {
            let Some(record) = self.objects.get(&oid) else {
                continue;
            };
            if !live.insert(oid) {
                continue;
            }
            for (name, value) in &record.features {
                let is_containment = schema
                    .feature(&record.class, name)
                    .map(|f| f.is_containment())
                    .unwrap_or(false);
                if is_containment {
                    queue.extend(value.values().filter_map(Value::as_ref_oid));
                }
            }
        }
        live
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::with_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(oid: u64, parent: Oid) -> ObjectRecord {
        let mut rec = ObjectRecord::new(Oid::new(oid), classes::FOLDER);
        rec.container = Some(Containment {
            parent,
            feature: features::CONTENTS.into(),
        });
        rec.features
            .insert(features::CONTENTS.into(), FeatureValue::Many(Vec::new()));
        rec
    }

    fn attach(graph: &mut Graph, parent: Oid, child: Oid) {
        if let Some(FeatureValue::Many(list)) = graph
            .get_mut(parent)
            .and_then(|r| r.features.get_mut(features::CONTENTS))
        {
            list.push(Value::Ref(child));
        }
    }

    #[test]
    fn fresh_graph_has_root_only() {
        let graph = Graph::with_root();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.get(Oid::ROOT).unwrap().class, classes::RESOURCE);
    }

    #[test]
    fn live_set_follows_containment() {
        let schema = Schema::standard();
        let mut graph = Graph::with_root();
        graph.insert(folder(1, Oid::ROOT));
        graph.insert(folder(2, Oid::new(1)));
        graph.insert(folder(3, Oid::new(1)));
        attach(&mut graph, Oid::ROOT, Oid::new(1));
        attach(&mut graph, Oid::new(1), Oid::new(2));

        let live = graph.live_set(&schema);
        assert!(live.contains(&Oid::ROOT));
        assert!(live.contains(&Oid::new(1)));
        assert!(live.contains(&Oid::new(2)));
        // Record exists but nothing contains it.
        assert!(!live.contains(&Oid::new(3)));
    }

    #[test]
    fn text_and_references() {
        let mut rec = ObjectRecord::new(Oid::new(4), classes::CONNECTION);
        rec.features
            .insert(features::NAME.into(), FeatureValue::Single(Value::text("edge")));
        rec.features
            .insert(features::SOURCE.into(), FeatureValue::Single(Value::Ref(Oid::new(7))));
        assert_eq!(rec.text(features::NAME), Some("edge"));
        assert_eq!(rec.referenced_oids().collect::<Vec<_>>(), vec![Oid::new(7)]);
    }
}
