use folio_types::{Oid, TypeError};

use crate::view::ViewId;

/// Errors from object store and working view operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The object does not exist in the working view.
    #[error("unknown object: {0}")]
    UnknownObject(Oid),

    /// A schema lookup or value check failed.
    #[error("schema error: {0}")]
    Schema(#[from] TypeError),

    /// A list operation was applied to a single-valued feature or vice versa.
    #[error("feature {class}.{feature} is {shape}")]
    Multiplicity {
        class: String,
        feature: String,
        shape: &'static str,
    },

    /// A list index was outside the feature's current bounds.
    #[error("index {index} out of bounds for {feature} (len {len})")]
    IndexOutOfBounds {
        feature: String,
        index: usize,
        len: usize,
    },

    /// The containment tree would become malformed.
    #[error("containment violation: {0}")]
    Containment(String),

    /// Optimistic concurrency conflict: the object changed since the view opened.
    #[error("commit conflict on {oid}: view saw version {expected}, store has {}", version_label(.actual))]
    Conflict {
        oid: Oid,
        expected: u64,
        actual: Option<u64>,
    },

    /// A reference points to an object another transaction removed.
    #[error("object {from} references {to}, which was removed concurrently")]
    ConcurrentRemoval { from: Oid, to: Oid },

    /// A reference points to an object that does not exist in the merged graph.
    #[error("object {from} references {to}, which does not exist")]
    DanglingReference { from: Oid, to: Oid },

    /// The store cannot serve the request (shut down or out of resources).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The view was already closed, or does not belong to this store.
    #[error("view {0} is closed")]
    ViewClosed(ViewId),

    /// A lock guarding store state was poisoned.
    #[error("lock poisoned: {0}")]
    Lock(String),
}

fn version_label(version: &Option<u64>) -> String {
    match version {
        Some(v) => v.to_string(),
        None => "none".into(),
    }
}

impl StoreError {
    pub(crate) fn multiplicity(class: &str, feature: &str, many: bool) -> Self {
        Self::Multiplicity {
            class: class.to_string(),
            feature: feature.to_string(),
            shape: if many { "many-valued" } else { "single-valued" },
        }
    }

    /// Returns `true` for failures caused by a concurrent writer.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::ConcurrentRemoval { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
