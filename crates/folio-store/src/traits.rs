use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use folio_types::Schema;

use crate::error::StoreResult;
use crate::object::Graph;
use crate::view::WorkingView;

/// Provenance attached to a commit. Not part of the change set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub author: Option<String>,
    pub comment: Option<String>,
}

impl CommitInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// One entry of the store's commit log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Sequential commit number, starting at 1.
    pub number: u64,
    pub timestamp: DateTime<Utc>,
    pub author: Option<String>,
    pub comment: Option<String>,
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
}

/// Object store with isolated working views and optimistic commits.
///
/// All implementations must satisfy these invariants:
/// - A view sees only the committed state it was opened (or last rebased)
///   on, plus its own changes.
/// - `commit` is atomic: either every change in the view becomes durable or
///   none does.
/// - A commit fails with a conflict (see
///   [`StoreError::is_conflict`](crate::StoreError::is_conflict)) when an
///   object the view modified or removed was committed by someone else after
///   the view was opened.
/// - After a successful commit or a rollback the view is rebased onto the
///   latest committed state and is clean.
pub trait ObjectStore: Send + Sync {
    /// The schema every view of this store is checked against.
    fn schema(&self) -> Arc<Schema>;

    /// Open a new isolated view over the latest committed state.
    ///
    /// Fails with `Unavailable` if the store is shut down or cannot allocate
    /// another view.
    fn open_view(&self) -> StoreResult<WorkingView>;

    /// Release a view. Closing an already closed view is a no-op.
    fn close_view(&self, view: &mut WorkingView) -> StoreResult<()>;

    /// Discard the view's pending changes and rebase it onto the latest
    /// committed state.
    fn rollback(&self, view: &mut WorkingView) -> StoreResult<()>;

    /// Make the view's changes durable.
    ///
    /// Cross references to objects the view removed must be purged first;
    /// a surviving reference fails the commit with `DanglingReference`.
    fn commit(&self, view: &mut WorkingView, info: &CommitInfo) -> StoreResult<CommitRecord>;

    /// The latest committed graph.
    fn head(&self) -> StoreResult<Arc<Graph>>;

    /// Returns `false` once the store has been shut down.
    fn is_active(&self) -> bool;

    /// Deactivate the store. Open views stay readable but cannot commit.
    fn shutdown(&self);

    /// Number of views opened and not yet closed.
    fn open_views(&self) -> usize;

    /// All commits so far, oldest first.
    fn commit_log(&self) -> StoreResult<Vec<CommitRecord>>;
}
