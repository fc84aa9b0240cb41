//! Transactions over the folio object graph.
//!
//! A [`Transaction`] owns one isolated working view. Callers mutate the view,
//! then commit: the pending changes are decoded into a change set, shown to
//! every registered listener and then to every validator, and only if all of
//! them accept is the store asked to make the changes durable. Any rejection
//! rolls the view back. [`Transaction::do_and_commit`] wraps a unit of work
//! and retries it with linear backoff when the store reports a conflict;
//! [`Transaction::do_and_commit_attributed`] does the same and records the
//! author its result names.
//!
//! [`Persistency`] is the usual entry point: it owns the store, the
//! configuration, and listeners shared by all transactions it opens.

pub mod backoff;
pub mod config;
pub mod error;
pub mod metadata;
pub mod persistency;
pub mod status;
pub mod transaction;

pub use backoff::{Backoff, ThreadSleep};
pub use config::{ConfigError, FolioConfig, RetryConfig};
pub use error::{TxnError, TxnResult};
pub use metadata::{Attributed, CommitMetadata};
pub use persistency::Persistency;
pub use status::{OperationalStatus, StatusService};
pub use transaction::{Transaction, TxnState};
