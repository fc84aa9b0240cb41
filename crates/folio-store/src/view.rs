//! Isolated, mutable working views over a committed graph.
//!
//! A [`WorkingView`] starts as a copy of the store's committed graph and is
//! mutated through schema-checked operations. Nothing a view does is visible
//! to other views until the store commits it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use folio_types::{features, FeatureDef, FeatureValue, Oid, Schema, Value};

use crate::delta::{self, RawDelta};
use crate::error::{StoreError, StoreResult};
use crate::object::{Containment, Graph, ObjectRecord};

/// Unique identifier of a working view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewId(Uuid);

impl ViewId {
    /// Time-ordered identifier for a newly opened view.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ViewId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An isolated working copy of the object graph.
///
/// Many-valued features behave as identity sets: adding a value that is
/// already present is a no-op. Adding an object to a containment feature
/// detaches it from its previous container first.
pub struct WorkingView {
    id: ViewId,
    schema: Arc<Schema>,
    base: Arc<Graph>,
    work: Graph,
    allocator: Arc<AtomicU64>,
    dirty: bool,
    open: bool,
}

impl WorkingView {
    /// Open a view over `base`. Called by store implementations; `allocator`
    /// is the store-wide source of fresh object identifiers.
    pub fn new(schema: Arc<Schema>, base: Arc<Graph>, allocator: Arc<AtomicU64>) -> Self {
        let work = (*base).clone();
        Self {
            id: ViewId::new(),
            schema,
            base,
            work,
            allocator,
            dirty: false,
            open: true,
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Returns `true` if the view holds changes reachable from the root.
    ///
    /// Objects created but never attached, and values set back to what the
    /// base holds, do not count.
    pub fn is_dirty(&self) -> bool {
        self.dirty && !self.raw_delta().is_empty()
    }

    /// The committed graph this view started from.
    pub fn base(&self) -> &Graph {
        &self.base
    }

    /// The working graph, including unattached objects.
    pub fn graph(&self) -> &Graph {
        &self.work
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Create a new, unattached object of `class`.
    pub fn create(&mut self, class: &str) -> StoreResult<Oid> {
        self.ensure_open()?;
        self.schema.check_instantiable(class)?;
        let oid = Oid::new(self.allocator.fetch_add(1, Ordering::Relaxed));
        let mut record = ObjectRecord::new(oid, class);
        for def in self.schema.features_of(class)? {
            if def.many {
                record
                    .features
                    .insert(def.name.clone(), FeatureValue::Many(Vec::new()));
            }
        }
        self.work.insert(record);
        self.dirty = true;
        Ok(oid)
    }

    /// Set a single-valued feature, returning the previous value.
    pub fn set(&mut self, oid: Oid, feature: &str, value: impl Into<Value>) -> StoreResult<Option<Value>> {
        self.ensure_open()?;
        let value = value.into();
        let def = self.feature_def(oid, feature, false)?;
        self.check_value(oid, feature, &value)?;

        let previous = self.single(oid, feature);
        if previous.as_ref() == Some(&value) {
            return Ok(previous);
        }
        if let (true, Some(child)) = (def.is_containment(), value.as_ref_oid()) {
            self.check_containable(oid, &def, child)?;
            self.detach(child)?;
            if let Some(old_child) = previous.as_ref().and_then(Value::as_ref_oid) {
                self.record_mut(old_child)?.container = None;
            }
            self.record_mut(child)?.container = Some(Containment {
                parent: oid,
                feature: feature.to_string(),
            });
        }
        self.record_mut(oid)?
            .features
            .insert(feature.to_string(), FeatureValue::Single(value));
        self.dirty = true;
        Ok(previous)
    }

    /// Clear a single-valued feature, returning the previous value.
    pub fn unset(&mut self, oid: Oid, feature: &str) -> StoreResult<Option<Value>> {
        self.ensure_open()?;
        let def = self.feature_def(oid, feature, false)?;
        let previous = match self.record_mut(oid)?.features.remove(feature) {
            Some(FeatureValue::Single(v)) => Some(v),
            _ => None,
        };
        if let Some(old) = &previous {
            if let (true, Some(child)) = (def.is_containment(), old.as_ref_oid()) {
                if let Some(record) = self.work.get_mut(child) {
                    record.container = None;
                }
            }
            self.dirty = true;
        }
        Ok(previous)
    }

    /// Add a value to a many-valued feature.
    ///
    /// Returns `false` without changing anything if the value is already
    /// present.
    pub fn add(&mut self, oid: Oid, feature: &str, value: impl Into<Value>) -> StoreResult<bool> {
        self.ensure_open()?;
        let value = value.into();
        let def = self.feature_def(oid, feature, true)?;
        self.check_value(oid, feature, &value)?;
        if self.list(oid, feature).contains(&value) {
            return Ok(false);
        }
        if let (true, Some(child)) = (def.is_containment(), value.as_ref_oid()) {
            self.check_containable(oid, &def, child)?;
            self.detach(child)?;
            self.record_mut(child)?.container = Some(Containment {
                parent: oid,
                feature: feature.to_string(),
            });
        }
        self.list_mut(oid, feature)?.push(value);
        self.dirty = true;
        Ok(true)
    }

    /// Remove a value from a many-valued feature. Removing a contained
    /// object leaves it unattached.
    pub fn remove(&mut self, oid: Oid, feature: &str, value: impl Into<Value>) -> StoreResult<bool> {
        self.ensure_open()?;
        let value = value.into();
        let def = self.feature_def(oid, feature, true)?;
        let list = self.list_mut(oid, feature)?;
        let Some(index) = list.iter().position(|v| *v == value) else {
            return Ok(false);
        };
        list.remove(index);
        if let (true, Some(child)) = (def.is_containment(), value.as_ref_oid()) {
            if let Some(record) = self.work.get_mut(child) {
                record.container = None;
            }
        }
        self.dirty = true;
        Ok(true)
    }

    /// Reorder a value within a many-valued feature.
    pub fn move_within(&mut self, oid: Oid, feature: &str, from: usize, to: usize) -> StoreResult<()> {
        self.ensure_open()?;
        self.feature_def(oid, feature, true)?;
        let list = self.list_mut(oid, feature)?;
        let len = list.len();
        for index in [from, to] {
            if index >= len {
                return Err(StoreError::IndexOutOfBounds {
                    feature: feature.to_string(),
                    index,
                    len,
                });
            }
        }
        if from != to {
            let value = list.remove(from);
            list.insert(to, value);
            self.dirty = true;
        }
        Ok(())
    }

    /// Detach an object from its container and drop it together with
    /// everything it contains.
    ///
    /// References held by surviving objects are left in place; see
    /// [`purge_references`](Self::purge_references).
    pub fn delete(&mut self, oid: Oid) -> StoreResult<()> {
        self.ensure_open()?;
        if oid.is_root() {
            return Err(StoreError::Containment(
                "the root resource cannot be deleted".into(),
            ));
        }
        self.record(oid)?;
        self.detach(oid)?;
        let mut queue = VecDeque::from([oid]);
        while let Some(next) = queue.pop_front() {
            queue.extend(self.children(next));
            self.work.remove(next);
        }
        self.dirty = true;
        Ok(())
    }

    /// Drop every cross reference that points at an object which is not
    /// reachable from the root. Returns the number of values removed.
    pub fn purge_references(&mut self) -> StoreResult<usize> {
        self.ensure_open()?;
        let live = self.work.live_set(&self.schema);
        let mut purged = 0;
        for record in self.work.records_mut() {
            if !live.contains(&record.oid) {
                continue;
            }
            record.features.retain(|_, value| match value {
                FeatureValue::Single(Value::Ref(target)) if !live.contains(target) => {
                    purged += 1;
                    false
                }
                _ => true,
            });
            for value in record.features.values_mut() {
                if let FeatureValue::Many(list) = value {
                    let before = list.len();
                    list.retain(|v| v.as_ref_oid().map_or(true, |t| live.contains(&t)));
                    purged += before - list.len();
                }
            }
        }
        if purged > 0 {
            self.dirty = true;
        }
        Ok(purged)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Handle for an object present in the working graph.
    pub fn object(&self, oid: Oid) -> Option<ObjectRef<'_>> {
        self.work.get(oid).map(|record| ObjectRef { view: self, record })
    }

    pub fn contains(&self, oid: Oid) -> bool {
        self.work.contains(oid)
    }

    pub fn class_of(&self, oid: Oid) -> Option<&str> {
        self.work.get(oid).map(|r| r.class.as_str())
    }

    pub fn get(&self, oid: Oid, feature: &str) -> Option<&FeatureValue> {
        self.work.get(oid).and_then(|r| r.features.get(feature))
    }

    pub fn text(&self, oid: Oid, feature: &str) -> Option<&str> {
        self.work.get(oid).and_then(|r| r.text(feature))
    }

    /// Values of a many-valued feature; empty if unset or unknown.
    pub fn list(&self, oid: Oid, feature: &str) -> &[Value] {
        self.get(oid, feature)
            .and_then(FeatureValue::as_many)
            .unwrap_or(&[])
    }

    pub fn container(&self, oid: Oid) -> Option<&Containment> {
        self.work.get(oid).and_then(|r| r.container.as_ref())
    }

    /// Directly contained objects across all containment features.
    pub fn children(&self, oid: Oid) -> Vec<Oid> {
        let Some(record) = self.work.get(oid) else {
            return Vec::new();
        };
        let Ok(defs) = self.schema.features_of(&record.class) else {
            return Vec::new();
        };
        defs.iter()
            .filter(|d| d.is_containment())
            .filter_map(|d| record.features.get(&d.name))
            .flat_map(FeatureValue::values)
            .filter_map(Value::as_ref_oid)
            .collect()
    }

    /// Returns `true` if the object is reachable from the root.
    pub fn is_attached(&self, oid: Oid) -> bool {
        let mut current = oid;
        for _ in 0..=self.work.len() {
            if current.is_root() {
                return self.work.contains(current);
            }
            match self.container(current) {
                Some(c) => current = c.parent,
                None => return false,
            }
        }
        false
    }

    /// Attached objects whose class is `class` or a subclass, ascending.
    pub fn find(&self, class: &str) -> Vec<Oid> {
        self.work
            .live_set(&self.schema)
            .into_iter()
            .filter(|oid| {
                self.class_of(*oid)
                    .is_some_and(|c| self.schema.is_subclass(c, class))
            })
            .collect()
    }

    /// Attached objects holding a cross reference to `target`, with the
    /// name of the referencing feature.
    pub fn referrers(&self, target: Oid) -> Vec<(ObjectRef<'_>, String)> {
        let mut out = Vec::new();
        for oid in self.work.live_set(&self.schema) {
            let Some(handle) = self.object(oid) else {
                continue;
            };
            for (name, value) in &handle.record.features {
                let cross = self
                    .schema
                    .feature(&handle.record.class, name)
                    .is_ok_and(FeatureDef::is_cross_reference);
                if cross && value.values().any(|v| v.as_ref_oid() == Some(target)) {
                    out.push((handle, name.clone()));
                }
            }
        }
        out
    }

    /// Everything this view changed relative to its base.
    pub fn raw_delta(&self) -> RawDelta {
        delta::compute(&self.schema, &self.base, &self.work)
    }

    // -----------------------------------------------------------------------
    // Lifecycle, driven by the owning store
    // -----------------------------------------------------------------------

    /// Replace the base with `latest` and discard all pending changes.
    pub fn rebase(&mut self, latest: Arc<Graph>) {
        self.work = (*latest).clone();
        self.base = latest;
        self.dirty = false;
    }

    /// Discard pending changes and refuse further use.
    pub fn mark_closed(&mut self) {
        self.work = (*self.base).clone();
        self.dirty = false;
        self.open = false;
    }

    pub(crate) fn ensure_open(&self) -> StoreResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(StoreError::ViewClosed(self.id))
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn record(&self, oid: Oid) -> StoreResult<&ObjectRecord> {
        self.work.get(oid).ok_or(StoreError::UnknownObject(oid))
    }

    fn record_mut(&mut self, oid: Oid) -> StoreResult<&mut ObjectRecord> {
        self.work.get_mut(oid).ok_or(StoreError::UnknownObject(oid))
    }

    /// Feature definition, checked for the expected multiplicity.
    fn feature_def(&self, oid: Oid, feature: &str, many: bool) -> StoreResult<FeatureDef> {
        let class = &self.record(oid)?.class;
        let def = self.schema.feature(class, feature)?;
        if def.many != many {
            return Err(StoreError::multiplicity(class, feature, def.many));
        }
        Ok(def.clone())
    }

    fn check_value(&self, oid: Oid, feature: &str, value: &Value) -> StoreResult<()> {
        let class = &self.record(oid)?.class;
        self.schema.check_value(class, feature, value)?;
        Ok(())
    }

    fn single(&self, oid: Oid, feature: &str) -> Option<Value> {
        self.get(oid, feature)
            .and_then(FeatureValue::as_single)
            .cloned()
    }

    fn list_mut(&mut self, oid: Oid, feature: &str) -> StoreResult<&mut Vec<Value>> {
        let record = self.record_mut(oid)?;
        let class = record.class.clone();
        let slot = record
            .features
            .entry(feature.to_string())
            .or_insert_with(|| FeatureValue::Many(Vec::new()));
        match slot {
            FeatureValue::Many(list) => Ok(list),
            FeatureValue::Single(_) => Err(StoreError::multiplicity(&class, feature, false)),
        }
    }

    /// Check that `child` may be placed in `parent`'s containment `def`.
    fn check_containable(&self, parent: Oid, def: &FeatureDef, child: Oid) -> StoreResult<()> {
        if child.is_root() {
            return Err(StoreError::Containment(
                "the root resource cannot be contained".into(),
            ));
        }
        let child_class = &self.record(child)?.class;
        if let Some(target) = def.target_class() {
            if !self.schema.is_subclass(child_class, target) {
                let parent_class = &self.record(parent)?.class;
                return Err(StoreError::Containment(format!(
                    "{child_class} {child} cannot be contained in {parent_class}.{}",
                    def.name
                )));
            }
        }
        let mut current = Some(parent);
        let mut steps = 0;
        while let Some(oid) = current {
            if oid == child {
                return Err(StoreError::Containment(format!(
                    "placing {child} under {parent} would create a cycle"
                )));
            }
            steps += 1;
            if steps > self.work.len() {
                break;
            }
            current = self.container(oid).map(|c| c.parent);
        }
        Ok(())
    }

    /// Remove `child` from whatever slot currently contains it.
    fn detach(&mut self, child: Oid) -> StoreResult<()> {
        let Some(containment) = self.record_mut(child)?.container.take() else {
            return Ok(());
        };
        if let Some(parent) = self.work.get_mut(containment.parent) {
            let clear_slot = match parent.features.get_mut(&containment.feature) {
                Some(FeatureValue::Many(list)) => {
                    list.retain(|v| v.as_ref_oid() != Some(child));
                    false
                }
                Some(FeatureValue::Single(Value::Ref(oid))) => *oid == child,
                _ => false,
            };
            if clear_slot {
                parent.features.remove(&containment.feature);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for WorkingView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkingView")
            .field("id", &self.id)
            .field("objects", &self.work.len())
            .field("dirty", &self.dirty)
            .field("open", &self.open)
            .finish()
    }
}

/// Borrowed handle to an object in a working view.
///
/// Handles let validators walk the graph (container, children, siblings)
/// without going back to the store.
#[derive(Clone, Copy)]
pub struct ObjectRef<'a> {
    view: &'a WorkingView,
    record: &'a ObjectRecord,
}

impl<'a> ObjectRef<'a> {
    pub fn oid(&self) -> Oid {
        self.record.oid
    }

    pub fn class(&self) -> &'a str {
        &self.record.class
    }

    pub fn record(&self) -> &'a ObjectRecord {
        self.record
    }

    pub fn schema(&self) -> &'a Schema {
        &self.view.schema
    }

    /// Returns `true` if this object's class is `class` or inherits from it.
    pub fn is_a(&self, class: &str) -> bool {
        self.view.schema.is_subclass(&self.record.class, class)
    }

    pub fn get(&self, feature: &str) -> Option<&'a FeatureValue> {
        self.record.features.get(feature)
    }

    pub fn text(&self, feature: &str) -> Option<&'a str> {
        self.record.text(feature)
    }

    /// The object's containing object, if any.
    pub fn container(&self) -> Option<ObjectRef<'a>> {
        self.record
            .container
            .as_ref()
            .and_then(|c| self.view.object(c.parent))
    }

    /// Name of the feature through which the container holds this object.
    pub fn containing_feature(&self) -> Option<&'a str> {
        self.record.container.as_ref().map(|c| c.feature.as_str())
    }

    pub fn children(&self) -> Vec<ObjectRef<'a>> {
        self.view
            .children(self.record.oid)
            .into_iter()
            .filter_map(|oid| self.view.object(oid))
            .collect()
    }

    /// Other objects held by the same container feature.
    pub fn siblings(&self) -> Vec<ObjectRef<'a>> {
        let Some(containment) = &self.record.container else {
            return Vec::new();
        };
        let Some(parent) = self.view.work.get(containment.parent) else {
            return Vec::new();
        };
        parent
            .features
            .get(&containment.feature)
            .into_iter()
            .flat_map(FeatureValue::values)
            .filter_map(Value::as_ref_oid)
            .filter(|oid| *oid != self.record.oid)
            .filter_map(|oid| self.view.object(oid))
            .collect()
    }

    pub fn is_attached(&self) -> bool {
        self.view.is_attached(self.record.oid)
    }

    /// Follow a reference held by this object. Only attached targets resolve.
    pub fn resolve(&self, oid: Oid) -> Option<ObjectRef<'a>> {
        if self.view.is_attached(oid) {
            self.view.object(oid)
        } else {
            None
        }
    }
}

impl PartialEq for ObjectRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.record.oid == other.record.oid
    }
}

impl fmt::Debug for ObjectRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("oid", &self.record.oid)
            .field("class", &self.record.class)
            .finish()
    }
}

impl fmt::Display for ObjectRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.record.class, self.record.oid)?;
        if let Some(id) = self.text(features::ID) {
            write!(f, " (id {id:?})")?;
        }
        Ok(())
    }
}

/// Lookup capability handed to change-set decoding.
///
/// `resolve` yields handles only for objects reachable from the root;
/// `base_record` exposes the committed state of objects that were removed.
pub trait ObjectResolver {
    fn schema(&self) -> &Schema;
    fn resolve(&self, oid: Oid) -> Option<ObjectRef<'_>>;
    fn base_record(&self, oid: Oid) -> Option<&ObjectRecord>;
    fn referrers(&self, target: Oid) -> Vec<(ObjectRef<'_>, String)>;
}

impl ObjectResolver for WorkingView {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn resolve(&self, oid: Oid) -> Option<ObjectRef<'_>> {
        if self.is_attached(oid) {
            self.object(oid)
        } else {
            None
        }
    }

    fn base_record(&self, oid: Oid) -> Option<&ObjectRecord> {
        self.base.get(oid)
    }

    fn referrers(&self, target: Oid) -> Vec<(ObjectRef<'_>, String)> {
        WorkingView::referrers(self, target)
    }
}
