//! Change-set decoding: raw store deltas to typed listener events.

use tracing::debug;

use folio_store::{FeatureDelta, ObjectResolver, RawDelta};
use folio_types::Value;

use crate::error::ValidationResult;
use crate::event::{ChangeKind, EventValue, FeatureChanged, ObjectCreated, ObjectRemoved};
use crate::listener::ChangeListener;

/// The decoded change set of one commit attempt.
///
/// Each sequence is ordered by ascending object identifier; feature changes
/// of one object keep the order the delta reported them in.
#[derive(Clone, Debug, Default)]
pub struct ChangeSet<'a> {
    pub created: Vec<ObjectCreated<'a>>,
    pub removed: Vec<ObjectRemoved<'a>>,
    pub changed: Vec<FeatureChanged<'a>>,
}

impl<'a> ChangeSet<'a> {
    /// Decode a raw delta, resolving references through `resolver`.
    pub fn decode<R>(delta: &RawDelta, resolver: &'a R) -> Self
    where
        R: ObjectResolver + ?Sized,
    {
        let resolve = move |value: &Value| -> EventValue<'a> {
            match value.as_ref_oid() {
                Some(oid) => resolver
                    .resolve(oid)
                    .map(EventValue::Object)
                    .unwrap_or(EventValue::Dangling(oid)),
                None => EventValue::Literal(value.clone()),
            }
        };

        let created = delta
            .new_objects
            .iter()
            .filter_map(|new| resolver.resolve(new.oid))
            .map(|object| ObjectCreated { object })
            .collect();

        let removed = delta
            .detached
            .iter()
            .map(|detached| ObjectRemoved {
                oid: detached.oid,
                class: detached.class.clone(),
                version: detached.version,
                last_state: resolver.base_record(detached.oid),
                referrers: resolver.referrers(detached.oid),
            })
            .collect();

        let mut changed = Vec::new();
        for revision in &delta.revisions {
            let Some(object) = resolver.resolve(revision.oid) else {
                continue;
            };
            for feature_delta in &revision.deltas {
                let feature = feature_delta.feature().to_string();
                let event = match feature_delta {
                    FeatureDelta::Set { old, new, .. } => FeatureChanged {
                        object,
                        feature,
                        kind: ChangeKind::Set,
                        old: old.as_ref().map(resolve),
                        new: Some(resolve(new)),
                        index: None,
                    },
                    FeatureDelta::Unset { old, .. } => FeatureChanged {
                        object,
                        feature,
                        kind: ChangeKind::Unset,
                        old: Some(resolve(old)),
                        new: None,
                        index: None,
                    },
                    FeatureDelta::Add { index, value, .. } => FeatureChanged {
                        object,
                        feature,
                        kind: ChangeKind::Add,
                        old: None,
                        new: Some(resolve(value)),
                        index: Some(*index),
                    },
                    FeatureDelta::Remove { index, value, .. } => FeatureChanged {
                        object,
                        feature,
                        kind: ChangeKind::Remove,
                        old: Some(resolve(value)),
                        new: None,
                        index: Some(*index),
                    },
                    FeatureDelta::Move { from, to, value, .. } => FeatureChanged {
                        object,
                        feature,
                        kind: ChangeKind::Move,
                        old: Some(EventValue::Position(*from)),
                        new: Some(resolve(value)),
                        index: Some(*to),
                    },
                };
                changed.push(event);
            }
        }

        Self {
            created,
            removed,
            changed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Total number of events.
    pub fn len(&self) -> usize {
        self.created.len() + self.removed.len() + self.changed.len()
    }

    /// Deliver every event to `chain` in order: created objects, then
    /// removed objects, then feature changes. Each event visits every
    /// listener in slice order before the next event is delivered.
    ///
    /// The first error stops delivery and is returned.
    pub fn dispatch(&self, chain: &[&dyn ChangeListener]) -> ValidationResult<()> {
        let outcome = self.deliver(chain);
        if let Err(err) = &outcome {
            debug!(rule = %err.rule, object = %err.object, reason = %err.message, "change set rejected");
        }
        outcome
    }

    fn deliver(&self, chain: &[&dyn ChangeListener]) -> ValidationResult<()> {
        for event in &self.created {
            for listener in chain {
                listener.on_object_created(event)?;
            }
        }
        for event in &self.removed {
            for listener in chain {
                listener.on_object_removed(event)?;
            }
        }
        for event in &self.changed {
            for listener in chain {
                listener.on_feature_changed(event)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;
    use std::sync::{Arc, Mutex};

    use folio_store::{Graph, WorkingView};
    use folio_types::classes::*;
    use folio_types::features::*;
    use folio_types::{Oid, Schema};

    use super::*;
    use crate::error::ValidationError;

    fn committed_project() -> (WorkingView, Oid, Oid) {
        // Build a graph in one view, then use its working graph as the base
        // of a fresh view so that the project counts as committed.
        let schema = Arc::new(Schema::standard());
        let allocator = Arc::new(AtomicU64::new(1));
        let mut setup = WorkingView::new(schema.clone(), Arc::new(Graph::with_root()), allocator.clone());
        let project = setup.create(FOLDER).unwrap();
        setup.add(Oid::ROOT, CONTENTS, project).unwrap();
        let top = setup.create(FOLDER).unwrap();
        setup.add(project, CONTENTS, top).unwrap();
        let base = Arc::new(setup.graph().clone());
        (WorkingView::new(schema, base, allocator), project, top)
    }

    #[derive(Default)]
    struct Recorder {
        label: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
        reject_created: bool,
    }

    impl ChangeListener for Recorder {
        fn name(&self) -> &str {
            self.label
        }

        fn on_object_created(&self, event: &ObjectCreated<'_>) -> ValidationResult<()> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:created:{}", self.label, event.object.oid()));
            if self.reject_created {
                return Err(ValidationError::new(self.label, event.object, "no"));
            }
            Ok(())
        }

        fn on_object_removed(&self, event: &ObjectRemoved<'_>) -> ValidationResult<()> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:removed:{}", self.label, event.oid));
            Ok(())
        }

        fn on_feature_changed(&self, event: &FeatureChanged<'_>) -> ValidationResult<()> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}:{}", self.label, event.kind, event.feature));
            Ok(())
        }
    }

    #[test]
    fn decode_resolves_references() {
        let (mut view, _project, top) = committed_project();
        let child = view.create(FOLDER).unwrap();
        view.add(top, CONTENTS, child).unwrap();
        view.set(top, NAME, "Top").unwrap();

        let delta = view.raw_delta();
        let changes = ChangeSet::decode(&delta, &view);
        assert_eq!(changes.created.len(), 1);
        assert_eq!(changes.created[0].object.oid(), child);
        assert_eq!(changes.changed.len(), 2);

        let name = &changes.changed[0];
        assert_eq!(name.kind, ChangeKind::Set);
        assert_eq!(name.new.as_ref().and_then(EventValue::as_text), Some("Top"));

        let add = &changes.changed[1];
        assert_eq!(add.kind, ChangeKind::Add);
        assert_eq!(add.index, Some(0));
        let added = add.new.as_ref().and_then(EventValue::as_object).unwrap();
        assert_eq!(added.oid(), child);
        assert_eq!(added.container().map(|c| c.oid()), Some(top));
    }

    #[test]
    fn removed_objects_carry_last_state() {
        let (mut view, project, top) = committed_project();
        view.delete(top).unwrap();
        let delta = view.raw_delta();
        let changes = ChangeSet::decode(&delta, &view);
        assert_eq!(changes.removed.len(), 1);
        assert_eq!(changes.removed[0].oid, top);
        assert!(changes.removed[0].last_state.is_some());

        let remove = &changes.changed[0];
        assert_eq!(remove.object.oid(), project);
        assert_eq!(remove.kind, ChangeKind::Remove);
        assert_eq!(remove.old, Some(EventValue::Dangling(top)));
    }

    #[test]
    fn moves_report_old_position() {
        let (mut view, project, _top) = committed_project();
        let second = view.create(FOLDER).unwrap();
        view.add(project, CONTENTS, second).unwrap();
        let base = Arc::new(view.graph().clone());
        let mut view = WorkingView::new(Arc::new(Schema::standard()), base, Arc::new(AtomicU64::new(50)));
        view.move_within(project, CONTENTS, 1, 0).unwrap();

        let delta = view.raw_delta();
        let changes = ChangeSet::decode(&delta, &view);
        assert_eq!(changes.changed.len(), 1);
        let moved = &changes.changed[0];
        assert_eq!(moved.kind, ChangeKind::Move);
        assert_eq!(moved.old, Some(EventValue::Position(1)));
        assert_eq!(moved.index, Some(0));
        assert_eq!(moved.new.as_ref().and_then(EventValue::oid), Some(second));
    }

    #[test]
    fn dispatch_is_event_major_in_chain_order() {
        let (mut view, _project, top) = committed_project();
        let child = view.create(FOLDER).unwrap();
        view.add(top, CONTENTS, child).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = Recorder { label: "first", seen: seen.clone(), ..Default::default() };
        let second = Recorder { label: "second", seen: seen.clone(), ..Default::default() };

        let delta = view.raw_delta();
        let changes = ChangeSet::decode(&delta, &view);
        let chain: [&dyn ChangeListener; 2] = [&first, &second];
        changes.dispatch(&chain).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                format!("first:created:{child}"),
                format!("second:created:{child}"),
                "first:ADD:contents".to_string(),
                "second:ADD:contents".to_string(),
            ]
        );
    }

    #[test]
    fn dispatch_stops_at_first_failure() {
        let (mut view, _project, top) = committed_project();
        let child = view.create(FOLDER).unwrap();
        view.add(top, CONTENTS, child).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let strict = Recorder { label: "strict", seen: seen.clone(), reject_created: true };
        let after = Recorder { label: "after", seen: seen.clone(), ..Default::default() };

        let delta = view.raw_delta();
        let changes = ChangeSet::decode(&delta, &view);
        let chain: [&dyn ChangeListener; 2] = [&strict, &after];
        let err = changes.dispatch(&chain).unwrap_err();
        assert_eq!(err.rule, "strict");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
