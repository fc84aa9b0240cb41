use folio_gate::ValidationError;
use folio_store::StoreError;

/// Errors surfaced by transactions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxnError {
    /// The transaction is closed or its store has been shut down.
    #[error("transaction is not active")]
    NotActive,

    /// The system is in maintenance (read-only) mode.
    #[error("commit refused: the system is in read-only mode")]
    ReadOnlyMode,

    /// A validator or listener rejected the change set.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Another transaction committed overlapping changes first.
    #[error("commit conflict: {0}")]
    CommitConflict(StoreError),

    /// Every retry attempt failed; carries the last failure.
    #[error("commit failed after {attempts} attempts: {last}")]
    CommitExhausted { attempts: u32, last: Box<TxnError> },

    /// The store could not open a working view.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The wait between retry attempts was interrupted.
    #[error("interrupted while waiting to retry")]
    Interrupted,

    /// The unit of work gave up on its own.
    #[error("unit of work aborted: {0}")]
    Aborted(String),

    /// Any other store failure.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl TxnError {
    /// Returns `true` for failures worth retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::CommitConflict(_))
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted(reason.into())
    }
}

impl From<StoreError> for TxnError {
    fn from(err: StoreError) -> Self {
        if err.is_conflict() {
            Self::CommitConflict(err)
        } else {
            Self::Store(err)
        }
    }
}

/// Result alias for transaction operations.
pub type TxnResult<T> = Result<T, TxnError>;
