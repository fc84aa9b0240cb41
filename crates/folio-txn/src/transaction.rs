//! The transaction controller.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use folio_gate::{ChangeListener, ChangeSet};
use folio_store::{CommitInfo, CommitRecord, ObjectStore, StoreError, ViewId, WorkingView};

use crate::backoff::{Backoff, ThreadSleep};
use crate::config::RetryConfig;
use crate::error::{TxnError, TxnResult};
use crate::metadata::CommitMetadata;
use crate::status::StatusService;

/// Lifecycle state of a [`Transaction`].
///
/// `Committed` and `RolledBack` describe the outcome of the last commit
/// attempt; the view has been rebased and accepts new work in both. Only
/// `Closed` is final.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TxnState {
    Open,
    Committing,
    Committed,
    RolledBack,
    Closed,
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// One isolated, mutable view of the object graph plus the validator chain
/// that guards its commits.
///
/// A transaction is owned by a single caller. Close it with [`close`] on
/// every exit path; dropping an unclosed transaction closes it as well.
///
/// [`close`]: Transaction::close
pub struct Transaction {
    store: Arc<dyn ObjectStore>,
    view: WorkingView,
    status: Arc<dyn StatusService>,
    listeners: Vec<Arc<dyn ChangeListener>>,
    validators: Vec<Arc<dyn ChangeListener>>,
    validators_enabled: bool,
    retry: RetryConfig,
    backoff: Arc<dyn Backoff>,
    state: TxnState,
}

impl Transaction {
    /// Open a transaction on a fresh view of `store`.
    ///
    /// Fails with [`TxnError::StoreUnavailable`] if the store cannot
    /// allocate a view.
    pub fn open(
        store: Arc<dyn ObjectStore>,
        status: Arc<dyn StatusService>,
        validators: Vec<Arc<dyn ChangeListener>>,
        listeners: Vec<Arc<dyn ChangeListener>>,
    ) -> TxnResult<Self> {
        let view = store.open_view().map_err(|err| match err {
            StoreError::Unavailable(reason) => TxnError::StoreUnavailable(reason),
            other => TxnError::Store(other),
        })?;
        debug!(
            view = %view.id(),
            validators = validators.len(),
            listeners = listeners.len(),
            "transaction opened"
        );
        Ok(Self {
            store,
            view,
            status,
            listeners,
            validators,
            validators_enabled: true,
            retry: RetryConfig::default(),
            backoff: Arc::new(ThreadSleep::new()),
            state: TxnState::Open,
        })
    }

    /// Replace the retry policy used by [`Transaction::do_and_commit`].
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replace how the transaction waits between retries.
    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    // ---- State ----

    pub fn id(&self) -> ViewId {
        self.view.id()
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Returns `true` until the transaction is closed or its store shuts
    /// down.
    pub fn is_active(&self) -> bool {
        self.state != TxnState::Closed && self.store.is_active()
    }

    pub fn is_dirty(&self) -> bool {
        self.view.is_dirty()
    }

    pub fn view(&self) -> &WorkingView {
        &self.view
    }

    /// Mutable access to the working view.
    pub fn view_mut(&mut self) -> TxnResult<&mut WorkingView> {
        if self.state == TxnState::Closed {
            return Err(TxnError::NotActive);
        }
        self.state = TxnState::Open;
        Ok(&mut self.view)
    }

    // ---- Validator chain ----

    /// Append a validator. It runs after those already registered.
    pub fn add_validator(&mut self, validator: Arc<dyn ChangeListener>) {
        self.validators.push(validator);
    }

    pub fn reset_validators(&mut self) {
        self.validators.clear();
    }

    /// Switch validation off or back on. Listeners are always notified.
    ///
    /// Disabling validation is meant for administrative bulk operations.
    pub fn enable_validators(&mut self, enabled: bool) {
        if !enabled {
            warn!(view = %self.view.id(), "validators disabled");
        }
        self.validators_enabled = enabled;
    }

    pub fn validators_enabled(&self) -> bool {
        self.validators_enabled
    }

    pub fn validator_names(&self) -> Vec<&str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ChangeListener>) {
        self.listeners.push(listener);
    }

    // ---- Commit and rollback ----

    /// Commit pending changes without provenance. See [`commit_with`].
    ///
    /// [`commit_with`]: Transaction::commit_with
    pub fn commit(&mut self) -> TxnResult<Option<CommitRecord>> {
        self.commit_with(&CommitInfo::default())
    }

    /// Validate and commit pending changes.
    ///
    /// Returns `Ok(None)` when there is nothing to commit. Any failure after
    /// the read-only check rolls the view back before it is returned.
    pub fn commit_with(&mut self, info: &CommitInfo) -> TxnResult<Option<CommitRecord>> {
        if !self.is_active() {
            return Err(TxnError::NotActive);
        }
        if !self.view.is_dirty() {
            return Ok(None);
        }
        if self.status.is_read_only() {
            return Err(TxnError::ReadOnlyMode);
        }

        self.state = TxnState::Committing;
        match self.apply(info) {
            Ok(record) => {
                self.state = TxnState::Committed;
                info!(
                    commit = record.number,
                    created = record.created,
                    modified = record.modified,
                    removed = record.removed,
                    author = record.author.as_deref().unwrap_or("-"),
                    "transaction committed"
                );
                Ok(Some(record))
            }
            Err(err) => {
                warn!(view = %self.view.id(), error = %err, "commit failed, rolling back");
                self.discard();
                Err(err)
            }
        }
    }

    fn apply(&mut self, info: &CommitInfo) -> TxnResult<CommitRecord> {
        self.notify()?;
        let purged = self.view.purge_references()?;
        if purged > 0 {
            debug!(view = %self.view.id(), purged, "references to removed objects purged");
        }
        Ok(self.store.commit(&mut self.view, info)?)
    }

    /// Decode the pending changes and run them past listeners, then
    /// validators.
    fn notify(&self) -> TxnResult<()> {
        let delta = self.view.raw_delta();
        let changes = ChangeSet::decode(&delta, &self.view);

        let mut chain: Vec<&dyn ChangeListener> = self.listeners.iter().map(|l| &**l).collect();
        if self.validators_enabled {
            chain.extend(self.validators.iter().map(|v| &**v));
        }
        changes.dispatch(&chain)?;
        Ok(())
    }

    /// Discard all pending changes.
    pub fn rollback(&mut self) -> TxnResult<()> {
        if self.state == TxnState::Closed {
            return Err(TxnError::NotActive);
        }
        self.store.rollback(&mut self.view)?;
        self.state = TxnState::RolledBack;
        Ok(())
    }

    fn discard(&mut self) {
        if let Err(err) = self.store.rollback(&mut self.view) {
            warn!(view = %self.view.id(), error = %err, "rollback failed");
        }
        self.state = TxnState::RolledBack;
    }

    /// Release the view. Further calls are no-ops.
    pub fn close(&mut self) -> TxnResult<()> {
        if self.state == TxnState::Closed {
            return Ok(());
        }
        self.store.close_view(&mut self.view)?;
        self.state = TxnState::Closed;
        debug!(view = %self.view.id(), "transaction closed");
        Ok(())
    }

    // ---- Unit of work ----

    /// Run `work` against the view and commit the result, retrying the whole
    /// unit on commit conflicts.
    ///
    /// Each retry starts from a rolled-back view rebased on the latest
    /// committed state, after waiting `attempt * base_delay`. `work` may
    /// therefore run several times and must not have effects outside the
    /// graph. Errors returned by `work` roll the view back and are final,
    /// except [`TxnError::CommitConflict`], which is retried like a store
    /// conflict. When the attempts run out the last failure is returned
    /// inside [`TxnError::CommitExhausted`]. A unit whose commit fails for
    /// any reason leaves no pending changes behind.
    ///
    /// The commit carries no author or comment; see
    /// [`Transaction::do_and_commit_attributed`].
    pub fn do_and_commit<T, F>(&mut self, work: F) -> TxnResult<T>
    where
        F: FnMut(&mut WorkingView) -> TxnResult<T>,
    {
        self.run_unit(work, |_| CommitInfo::default())
    }

    /// Like [`Transaction::do_and_commit`], but the result names the author
    /// and comment recorded with the commit.
    pub fn do_and_commit_attributed<T, F>(&mut self, work: F) -> TxnResult<T>
    where
        T: CommitMetadata,
        F: FnMut(&mut WorkingView) -> TxnResult<T>,
    {
        self.run_unit(work, T::commit_info)
    }

    fn run_unit<T, F, M>(&mut self, mut work: F, provenance: M) -> TxnResult<T>
    where
        F: FnMut(&mut WorkingView) -> TxnResult<T>,
        M: Fn(&T) -> CommitInfo,
    {
        let attempts = self.retry.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.attempt(&mut work, &provenance) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_conflict() => err,
                Err(err) => return Err(err),
            };

            if attempt >= attempts {
                error!(view = %self.view.id(), attempts, error = %err, "commit retries exhausted");
                return Err(TxnError::CommitExhausted {
                    attempts,
                    last: Box::new(err),
                });
            }

            let delay = self.retry.delay_for(attempt);
            warn!(
                view = %self.view.id(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "commit conflict, retrying"
            );
            self.backoff.wait(delay)?;
        }
    }

    fn attempt<T, F, M>(&mut self, work: &mut F, provenance: &M) -> TxnResult<T>
    where
        F: FnMut(&mut WorkingView) -> TxnResult<T>,
        M: Fn(&T) -> CommitInfo,
    {
        if !self.is_active() {
            return Err(TxnError::NotActive);
        }
        self.state = TxnState::Open;
        let value = match work(&mut self.view) {
            Ok(value) => value,
            Err(err) => {
                debug!(view = %self.view.id(), error = %err, "unit of work failed");
                self.discard();
                return Err(err);
            }
        };
        if let Err(err) = self.commit_with(&provenance(&value)) {
            if self.view.is_dirty() {
                self.discard();
            }
            return Err(err);
        }
        Ok(value)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state != TxnState::Closed {
            if let Err(err) = self.close() {
                warn!(view = %self.view.id(), error = %err, "closing dropped transaction failed");
            }
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("view", &self.view.id())
            .field("state", &self.state)
            .field("dirty", &self.view.is_dirty())
            .field("validators", &self.validator_names())
            .field("validators_enabled", &self.validators_enabled)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use folio_gate::{AuditTrail, ValidationConfig, ValidatorKind};
    use folio_store::InMemoryObjectStore;
    use folio_types::classes::*;
    use folio_types::features::*;
    use folio_types::Oid;

    use super::*;
    use crate::status::OperationalStatus;

    fn open(store: &Arc<InMemoryObjectStore>) -> Transaction {
        let config = ValidationConfig::default();
        Transaction::open(
            store.clone(),
            Arc::new(OperationalStatus::new()),
            folio_gate::default_chain(&config),
            Vec::new(),
        )
        .unwrap()
    }

    fn folder(view: &mut WorkingView, parent: Oid, id: &str) -> TxnResult<Oid> {
        let oid = view.create(FOLDER)?;
        view.set(oid, ID, id)?;
        view.set(oid, NAME, id)?;
        view.add(parent, CONTENTS, oid)?;
        Ok(oid)
    }

    #[test]
    fn clean_commit_is_a_no_op() {
        let store = Arc::new(InMemoryObjectStore::standard());
        let mut txn = open(&store);
        assert_eq!(txn.commit().unwrap(), None);
        assert_eq!(txn.state(), TxnState::Open);
        assert!(store.commit_log().unwrap().is_empty());
    }

    #[test]
    fn unattached_create_is_not_a_change() {
        let store = Arc::new(InMemoryObjectStore::standard());
        let mut txn = open(&store);
        txn.view_mut().unwrap().create(FOLDER).unwrap();
        assert!(!txn.is_dirty());
        assert_eq!(txn.commit().unwrap(), None);
        assert!(store.commit_log().unwrap().is_empty());
    }

    #[test]
    fn set_then_revert_is_not_a_change() {
        let store = Arc::new(InMemoryObjectStore::standard());
        let mut txn = open(&store);
        let top = folder(txn.view_mut().unwrap(), Oid::ROOT, "top").unwrap();
        txn.commit().unwrap().unwrap();

        let view = txn.view_mut().unwrap();
        view.set(top, NAME, "renamed").unwrap();
        view.set(top, NAME, "top").unwrap();
        assert_eq!(txn.commit().unwrap(), None);
        assert_eq!(store.commit_log().unwrap().len(), 1);
    }

    #[test]
    fn unit_of_work_may_return_any_type() {
        let store = Arc::new(InMemoryObjectStore::standard());
        let mut txn = open(&store);
        let (top, depth) = txn
            .do_and_commit(|view| Ok((folder(view, Oid::ROOT, "top")?, 1u8)))
            .unwrap();
        assert_eq!(depth, 1);
        assert!(store.head().unwrap().get(top).is_some());
        assert_eq!(store.commit_log().unwrap()[0].author, None);
    }

    #[test]
    fn commit_then_continue() {
        let store = Arc::new(InMemoryObjectStore::standard());
        let mut txn = open(&store);

        folder(txn.view_mut().unwrap(), Oid::ROOT, "p1").unwrap();
        let record = txn.commit().unwrap().unwrap();
        assert_eq!(record.number, 1);
        assert_eq!(txn.state(), TxnState::Committed);
        assert!(!txn.is_dirty());

        folder(txn.view_mut().unwrap(), Oid::ROOT, "p2").unwrap();
        assert_eq!(txn.state(), TxnState::Open);
        assert_eq!(txn.commit().unwrap().unwrap().number, 2);
        assert_eq!(txn.view().list(Oid::ROOT, CONTENTS).len(), 2);
    }

    #[test]
    fn validation_failure_rolls_back() {
        let store = Arc::new(InMemoryObjectStore::standard());
        let mut txn = open(&store);
        folder(txn.view_mut().unwrap(), Oid::ROOT, "bad id").unwrap();

        let err = txn.commit().unwrap_err();
        assert!(matches!(&err, TxnError::Validation(v) if v.rule == "id"));
        assert_eq!(txn.state(), TxnState::RolledBack);
        assert!(!txn.is_dirty());
        assert!(txn.view().list(Oid::ROOT, CONTENTS).is_empty());
        assert!(store.commit_log().unwrap().is_empty());
    }

    #[test]
    fn disabled_validators_let_anything_through() {
        let store = Arc::new(InMemoryObjectStore::standard());
        let mut txn = open(&store);
        txn.enable_validators(false);
        folder(txn.view_mut().unwrap(), Oid::ROOT, "bad id").unwrap();
        assert!(txn.commit().unwrap().is_some());

        txn.enable_validators(true);
        folder(txn.view_mut().unwrap(), Oid::ROOT, "also bad").unwrap();
        assert!(txn.commit().is_err());
    }

    #[test]
    fn validator_chain_can_be_rebuilt() {
        let store = Arc::new(InMemoryObjectStore::standard());
        let mut txn = open(&store);
        assert_eq!(txn.validator_names(), vec!["id", "name", "text_length", "connection"]);

        txn.reset_validators();
        assert!(txn.validator_names().is_empty());
        folder(txn.view_mut().unwrap(), Oid::ROOT, "bad id").unwrap();
        assert!(txn.commit().unwrap().is_some());

        txn.add_validator(ValidatorKind::Id.build(&ValidationConfig::default()));
        folder(txn.view_mut().unwrap(), Oid::ROOT, "bad id 2").unwrap();
        assert!(txn.commit().is_err());
    }

    #[test]
    fn explicit_rollback() {
        let store = Arc::new(InMemoryObjectStore::standard());
        let mut txn = open(&store);
        folder(txn.view_mut().unwrap(), Oid::ROOT, "p").unwrap();
        txn.rollback().unwrap();
        assert_eq!(txn.state(), TxnState::RolledBack);
        assert!(!txn.is_dirty());
        assert_eq!(txn.commit().unwrap(), None);
    }

    #[test]
    fn closed_transaction_is_inactive() {
        let store = Arc::new(InMemoryObjectStore::standard());
        let mut txn = open(&store);
        assert_eq!(store.open_views(), 1);
        txn.close().unwrap();
        txn.close().unwrap();
        assert_eq!(store.open_views(), 0);
        assert!(!txn.is_active());
        assert_eq!(txn.commit(), Err(TxnError::NotActive));
        assert_eq!(txn.rollback(), Err(TxnError::NotActive));
        assert!(matches!(txn.view_mut(), Err(TxnError::NotActive)));
        assert_eq!(txn.do_and_commit(|_| Ok(())), Err(TxnError::NotActive));
    }

    #[test]
    fn drop_closes() {
        let store = Arc::new(InMemoryObjectStore::standard());
        {
            let _txn = open(&store);
            assert_eq!(store.open_views(), 1);
        }
        assert_eq!(store.open_views(), 0);
    }

    #[test]
    fn work_error_is_final_and_rolls_back() {
        let store = Arc::new(InMemoryObjectStore::standard());
        let mut txn = open(&store);
        let mut runs = 0;
        let err = txn
            .do_and_commit(|view| -> TxnResult<()> {
                runs += 1;
                folder(view, Oid::ROOT, "p")?;
                Err(TxnError::aborted("changed my mind"))
            })
            .unwrap_err();
        assert_eq!(err, TxnError::Aborted("changed my mind".into()));
        assert_eq!(runs, 1);
        assert!(!txn.is_dirty());
        assert!(store.commit_log().unwrap().is_empty());
    }

    #[test]
    fn listeners_see_rejected_changes() {
        let store = Arc::new(InMemoryObjectStore::standard());
        let trail = Arc::new(AuditTrail::new());
        let mut txn = open(&store);
        txn.add_listener(trail.clone());

        folder(txn.view_mut().unwrap(), Oid::ROOT, "bad id").unwrap();
        assert!(txn.commit().is_err());
        assert!(trail.entries()[0].starts_with("created Folder"));
    }

    #[test]
    fn removal_purges_references() {
        let store = Arc::new(InMemoryObjectStore::standard());
        let mut txn = open(&store);
        let ids = txn
            .do_and_commit(|view| {
                let project = folder(view, Oid::ROOT, "p")?;
                let model = view.create(MODEL)?;
                view.set(model, ID, "m")?;
                view.set(model, NAME, "m")?;
                view.add(project, CONTENTS, model)?;
                let a = view.create(NODE)?;
                view.set(a, ID, "a")?;
                view.set(a, NAME, "a")?;
                view.add(model, CONTENTS, a)?;
                let b = view.create(NODE)?;
                view.set(b, ID, "b")?;
                view.set(b, NAME, "b")?;
                view.add(model, CONTENTS, b)?;
                let link = view.create(CONNECTION)?;
                view.set(link, ID, "ab")?;
                view.set(link, NAME, "ab")?;
                view.set(link, SOURCE, a)?;
                view.set(link, TARGET, b)?;
                view.add(model, CONTENTS, link)?;
                view.add(a, OUTGOING, link)?;
                view.add(b, INCOMING, link)?;
                Ok((a, b, link))
            })
            .unwrap();
        let (a, b, link) = ids;

        txn.do_and_commit(|view| Ok(view.delete(link)?)).unwrap();

        let head = store.head().unwrap();
        assert!(head.get(link).is_none());
        for node in [a, b] {
            assert_eq!(head.get(node).unwrap().referenced_oids().count(), 0);
        }
    }
}
