use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::debug;

use folio_types::{Oid, Schema};

use crate::error::{StoreError, StoreResult};
use crate::object::Graph;
use crate::traits::{CommitInfo, CommitRecord, ObjectStore};
use crate::view::{ViewId, WorkingView};

struct StoreState {
    committed: Arc<Graph>,
    open_views: HashSet<ViewId>,
    log: Vec<CommitRecord>,
}

/// In-memory object store with per-object optimistic versioning.
///
/// Intended for tests and embedding. Committed state is an immutable
/// [`Graph`] snapshot behind a `RwLock`; each commit swaps in a new snapshot.
pub struct InMemoryObjectStore {
    schema: Arc<Schema>,
    state: RwLock<StoreState>,
    next_oid: Arc<AtomicU64>,
    active: AtomicBool,
    view_limit: Option<usize>,
}

impl InMemoryObjectStore {
    /// Create a store holding only the root resource.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema: Arc::new(schema),
            state: RwLock::new(StoreState {
                committed: Arc::new(Graph::with_root()),
                open_views: HashSet::new(),
                log: Vec::new(),
            }),
            next_oid: Arc::new(AtomicU64::new(Oid::ROOT.next().as_u64())),
            active: AtomicBool::new(true),
            view_limit: None,
        }
    }

    /// Store over [`Schema::standard`].
    pub fn standard() -> Self {
        Self::new(Schema::standard())
    }

    /// Cap the number of simultaneously open views.
    pub fn with_view_limit(mut self, limit: usize) -> Self {
        self.view_limit = Some(limit);
        self
    }

    /// Number of committed objects, including the root.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.committed.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::standard()
    }
}

/// Check that every object the view touched still has the version the view
/// saw when it was opened.
fn check_versions(latest: &Graph, touched: impl Iterator<Item = (Oid, u64)>) -> StoreResult<()> {
    for (oid, expected) in touched {
        let actual = latest.get(oid).map(|r| r.version);
        if actual != Some(expected) {
            return Err(StoreError::Conflict {
                oid,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

impl ObjectStore for InMemoryObjectStore {
    fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    fn open_view(&self) -> StoreResult<WorkingView> {
        if !self.is_active() {
            return Err(StoreError::Unavailable("store is shut down".into()));
        }
        let mut state = self.write()?;
        if let Some(limit) = self.view_limit {
            if state.open_views.len() >= limit {
                return Err(StoreError::Unavailable(format!(
                    "view limit of {limit} reached"
                )));
            }
        }
        let view = WorkingView::new(
            Arc::clone(&self.schema),
            Arc::clone(&state.committed),
            Arc::clone(&self.next_oid),
        );
        state.open_views.insert(view.id());
        debug!(view = %view.id(), open = state.open_views.len(), "view opened");
        Ok(view)
    }

    fn close_view(&self, view: &mut WorkingView) -> StoreResult<()> {
        if !view.is_open() {
            return Ok(());
        }
        let mut state = self.write()?;
        state.open_views.remove(&view.id());
        view.mark_closed();
        debug!(view = %view.id(), open = state.open_views.len(), "view closed");
        Ok(())
    }

    fn rollback(&self, view: &mut WorkingView) -> StoreResult<()> {
        view.ensure_open()?;
        let latest = Arc::clone(&self.read()?.committed);
        view.rebase(latest);
        debug!(view = %view.id(), "view rolled back");
        Ok(())
    }

    fn commit(&self, view: &mut WorkingView, info: &CommitInfo) -> StoreResult<CommitRecord> {
        view.ensure_open()?;
        if !self.is_active() {
            return Err(StoreError::Unavailable("store is shut down".into()));
        }
        let delta = view.raw_delta();
        let mut state = self.write()?;
        if !state.open_views.contains(&view.id()) {
            return Err(StoreError::ViewClosed(view.id()));
        }

        let latest = Arc::clone(&state.committed);
        check_versions(
            &latest,
            delta
                .revisions
                .iter()
                .map(|r| (r.oid, r.version))
                .chain(delta.detached.iter().map(|d| (d.oid, d.version))),
        )?;

        let mut merged = (*latest).clone();
        for detached in &delta.detached {
            merged.remove(detached.oid);
        }
        for revision in &delta.revisions {
            if let Some(record) = view.graph().get(revision.oid) {
                let mut record = record.clone();
                record.version = revision.version + 1;
                merged.insert(record);
            }
        }
        for new in &delta.new_objects {
            if let Some(record) = view.graph().get(new.oid) {
                let mut record = record.clone();
                record.version = 1;
                merged.insert(record);
            }
        }

        let removed_here: BTreeSet<Oid> = delta.detached.iter().map(|d| d.oid).collect();
        for record in merged.records() {
            for target in record.referenced_oids() {
                if merged.contains(target) {
                    continue;
                }
                let removed_concurrently = view.base().contains(target)
                    && !latest.contains(target)
                    && !removed_here.contains(&target);
                return Err(if removed_concurrently {
                    StoreError::ConcurrentRemoval {
                        from: record.oid,
                        to: target,
                    }
                } else {
                    StoreError::DanglingReference {
                        from: record.oid,
                        to: target,
                    }
                });
            }
        }

        let committed = Arc::new(merged);
        let entry = CommitRecord {
            number: state.log.len() as u64 + 1,
            timestamp: Utc::now(),
            author: info.author.clone(),
            comment: info.comment.clone(),
            created: delta.new_objects.len(),
            modified: delta.revisions.len(),
            removed: delta.detached.len(),
        };
        state.committed = Arc::clone(&committed);
        state.log.push(entry.clone());
        drop(state);

        view.rebase(committed);
        debug!(
            view = %view.id(),
            commit = entry.number,
            created = entry.created,
            modified = entry.modified,
            removed = entry.removed,
            "commit applied"
        );
        Ok(entry)
    }

    fn head(&self) -> StoreResult<Arc<Graph>> {
        Ok(Arc::clone(&self.read()?.committed))
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        self.active.store(false, Ordering::SeqCst);
        debug!("store shut down");
    }

    fn open_views(&self) -> usize {
        self.read().map(|s| s.open_views.len()).unwrap_or(0)
    }

    fn commit_log(&self) -> StoreResult<Vec<CommitRecord>> {
        Ok(self.read()?.log.clone())
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("active", &self.is_active())
            .field("open_views", &self.open_views())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_types::classes::*;
    use folio_types::features::*;

    fn add_folder(view: &mut WorkingView, parent: Oid, id: &str) -> Oid {
        let oid = view.create(FOLDER).unwrap();
        view.set(oid, ID, id).unwrap();
        view.add(parent, CONTENTS, oid).unwrap();
        oid
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    #[test]
    fn open_and_close_are_counted() {
        let store = InMemoryObjectStore::standard();
        let mut a = store.open_view().unwrap();
        let mut b = store.open_view().unwrap();
        assert_eq!(store.open_views(), 2);
        store.close_view(&mut a).unwrap();
        store.close_view(&mut a).unwrap();
        assert_eq!(store.open_views(), 1);
        store.close_view(&mut b).unwrap();
        assert_eq!(store.open_views(), 0);
    }

    #[test]
    fn view_limit_reports_unavailable() {
        let store = InMemoryObjectStore::standard().with_view_limit(1);
        let mut first = store.open_view().unwrap();
        assert!(matches!(store.open_view(), Err(StoreError::Unavailable(_))));
        store.close_view(&mut first).unwrap();
        assert!(store.open_view().is_ok());
    }

    #[test]
    fn views_are_isolated_until_commit() {
        let store = InMemoryObjectStore::standard();
        let mut writer = store.open_view().unwrap();
        let reader = store.open_view().unwrap();
        let f = add_folder(&mut writer, Oid::ROOT, "top");
        assert!(!reader.contains(f));

        store.commit(&mut writer, &CommitInfo::new()).unwrap();
        assert!(!reader.contains(f));
        assert!(store.head().unwrap().contains(f));
        assert!(!writer.is_dirty());
        assert!(writer.contains(f));
    }

    #[test]
    fn rollback_discards_changes() {
        let store = InMemoryObjectStore::standard();
        let mut view = store.open_view().unwrap();
        let f = add_folder(&mut view, Oid::ROOT, "top");
        store.rollback(&mut view).unwrap();
        assert!(!view.contains(f));
        assert!(!view.is_dirty());
        assert_eq!(store.len().unwrap(), 1);
    }

    // -----------------------------------------------------------------------
    // Commits
    // -----------------------------------------------------------------------

    #[test]
    fn commit_bumps_versions_and_logs() {
        let store = InMemoryObjectStore::standard();
        let mut view = store.open_view().unwrap();
        let f = add_folder(&mut view, Oid::ROOT, "top");
        let record = store
            .commit(&mut view, &CommitInfo::new().with_author("ada"))
            .unwrap();
        assert_eq!(record.number, 1);
        assert_eq!(record.created, 1);
        assert_eq!(record.modified, 1);
        assert_eq!(record.author.as_deref(), Some("ada"));

        let head = store.head().unwrap();
        assert_eq!(head.get(f).unwrap().version, 1);
        assert_eq!(head.get(Oid::ROOT).unwrap().version, 2);
        assert_eq!(store.commit_log().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_modification_conflicts() {
        let store = InMemoryObjectStore::standard();
        let mut first = store.open_view().unwrap();
        let mut second = store.open_view().unwrap();
        add_folder(&mut first, Oid::ROOT, "a");
        add_folder(&mut second, Oid::ROOT, "b");

        store.commit(&mut first, &CommitInfo::new()).unwrap();
        let err = store.commit(&mut second, &CommitInfo::new()).unwrap_err();
        assert!(err.is_conflict());
        assert!(matches!(
            err,
            StoreError::Conflict { oid, expected: 1, actual: Some(2) } if oid == Oid::ROOT
        ));

        store.rollback(&mut second).unwrap();
        add_folder(&mut second, Oid::ROOT, "b");
        store.commit(&mut second, &CommitInfo::new()).unwrap();
        assert_eq!(store.head().unwrap().len(), 3);
    }

    #[test]
    fn disjoint_changes_merge() {
        let store = InMemoryObjectStore::standard();
        let mut setup = store.open_view().unwrap();
        let a = add_folder(&mut setup, Oid::ROOT, "a");
        let b = add_folder(&mut setup, Oid::ROOT, "b");
        store.commit(&mut setup, &CommitInfo::new()).unwrap();

        let mut first = store.open_view().unwrap();
        let mut second = store.open_view().unwrap();
        first.set(a, NAME, "alpha").unwrap();
        second.set(b, NAME, "beta").unwrap();
        store.commit(&mut first, &CommitInfo::new()).unwrap();
        store.commit(&mut second, &CommitInfo::new()).unwrap();

        let head = store.head().unwrap();
        assert_eq!(head.get(a).unwrap().text(NAME), Some("alpha"));
        assert_eq!(head.get(b).unwrap().text(NAME), Some("beta"));
    }

    #[test]
    fn deleting_removes_committed_subtree() {
        let store = InMemoryObjectStore::standard();
        let mut view = store.open_view().unwrap();
        let a = add_folder(&mut view, Oid::ROOT, "a");
        let b = add_folder(&mut view, a, "b");
        store.commit(&mut view, &CommitInfo::new()).unwrap();

        view.delete(a).unwrap();
        let record = store.commit(&mut view, &CommitInfo::new()).unwrap();
        assert_eq!(record.removed, 2);
        let head = store.head().unwrap();
        assert!(!head.contains(a));
        assert!(!head.contains(b));
    }

    #[test]
    fn unpurged_reference_is_dangling_not_conflict() {
        let store = InMemoryObjectStore::standard();
        let mut view = store.open_view().unwrap();
        let top = add_folder(&mut view, Oid::ROOT, "top");
        let model = view.create(MODEL).unwrap();
        view.add(top, CONTENTS, model).unwrap();
        let node = view.create(NODE).unwrap();
        let edge = view.create(CONNECTION).unwrap();
        view.add(model, CONTENTS, node).unwrap();
        view.add(model, CONTENTS, edge).unwrap();
        view.set(edge, SOURCE, node).unwrap();
        view.set(edge, TARGET, node).unwrap();
        store.commit(&mut view, &CommitInfo::new()).unwrap();

        view.delete(node).unwrap();
        let err = store.commit(&mut view, &CommitInfo::new()).unwrap_err();
        assert!(matches!(err, StoreError::DanglingReference { .. }));
        assert!(!err.is_conflict());

        view.purge_references().unwrap();
        store.commit(&mut view, &CommitInfo::new()).unwrap();
        assert!(store.head().unwrap().get(edge).unwrap().features.get(SOURCE).is_none());
    }

    #[test]
    fn reference_to_concurrently_removed_object_conflicts() {
        let store = InMemoryObjectStore::standard();
        let mut setup = store.open_view().unwrap();
        let top = add_folder(&mut setup, Oid::ROOT, "top");
        let left = setup.create(MODEL).unwrap();
        let right = setup.create(MODEL).unwrap();
        setup.add(top, CONTENTS, left).unwrap();
        setup.add(top, CONTENTS, right).unwrap();
        let node = setup.create(NODE).unwrap();
        setup.add(left, CONTENTS, node).unwrap();
        let other = setup.create(NODE).unwrap();
        let edge = setup.create(CONNECTION).unwrap();
        setup.add(right, CONTENTS, other).unwrap();
        setup.add(right, CONTENTS, edge).unwrap();
        setup.set(edge, SOURCE, other).unwrap();
        setup.set(edge, TARGET, other).unwrap();
        store.commit(&mut setup, &CommitInfo::new()).unwrap();

        let mut remover = store.open_view().unwrap();
        let mut linker = store.open_view().unwrap();
        remover.delete(node).unwrap();
        store.commit(&mut remover, &CommitInfo::new()).unwrap();

        // The remover never touched `edge`, so only the reference scan
        // notices that its new target is gone.
        linker.set(edge, TARGET, node).unwrap();
        let err = store.commit(&mut linker, &CommitInfo::new()).unwrap_err();
        assert!(matches!(err, StoreError::ConcurrentRemoval { to, .. } if to == node));
        assert!(err.is_conflict());
    }

    #[test]
    fn shutdown_blocks_views_and_commits() {
        let store = InMemoryObjectStore::standard();
        let mut view = store.open_view().unwrap();
        add_folder(&mut view, Oid::ROOT, "a");
        store.shutdown();
        assert!(!store.is_active());
        assert!(matches!(store.open_view(), Err(StoreError::Unavailable(_))));
        assert!(matches!(
            store.commit(&mut view, &CommitInfo::new()),
            Err(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn closed_view_cannot_commit() {
        let store = InMemoryObjectStore::standard();
        let mut view = store.open_view().unwrap();
        store.close_view(&mut view).unwrap();
        assert!(matches!(
            store.commit(&mut view, &CommitInfo::new()),
            Err(StoreError::ViewClosed(_))
        ));
    }
}
