//! Object store for folio.
//!
//! The store holds a hierarchical object graph rooted at a single resource.
//! Callers never mutate committed state directly: they open a
//! [`WorkingView`], change it, and ask the store to commit it. Commits are
//! optimistic; a view whose touched objects were committed by someone else in
//! the meantime fails with a conflict and must be rolled back and redone.
//!
//! # Key Types
//!
//! - [`ObjectStore`] -- the store contract (views, commit, rollback, log)
//! - [`WorkingView`] -- isolated mutable copy of the graph
//! - [`ObjectRef`] -- borrowed handle for navigating a view
//! - [`RawDelta`] -- what a view changed: new, detached and revised objects
//! - [`InMemoryObjectStore`] -- `RwLock`-guarded snapshot store
//!
//! # Design Rules
//!
//! 1. Objects are live only while reachable from the root through
//!    containment; unreachable objects are dropped at commit.
//! 2. Many-valued features are identity sets.
//! 3. Every object carries a committed version; a commit conflicts when a
//!    touched object's version moved.
//! 4. A commit never leaves a reference to a missing object.

pub mod delta;
pub mod error;
pub mod memory;
pub mod object;
pub mod traits;
pub mod view;

pub use delta::{DetachedObject, FeatureDelta, NewObject, RawDelta, RevisionDelta};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use object::{Containment, Graph, ObjectRecord};
pub use traits::{CommitInfo, CommitRecord, ObjectStore};
pub use view::{ObjectRef, ObjectResolver, ViewId, WorkingView};
