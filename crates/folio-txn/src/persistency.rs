//! Entry point that wires a store, its configuration, and shared listeners
//! into ready-to-use transactions.

use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::info;

use folio_gate::{default_chain, ChangeListener, ValidatorKind};
use folio_store::{InMemoryObjectStore, ObjectStore, StoreError};

use crate::backoff::{Backoff, ThreadSleep};
use crate::config::FolioConfig;
use crate::error::{TxnError, TxnResult};
use crate::status::{OperationalStatus, StatusService};
use crate::transaction::Transaction;

/// Transaction factory and registry of process-wide change listeners.
pub struct Persistency {
    store: Arc<dyn ObjectStore>,
    status: Arc<dyn StatusService>,
    config: FolioConfig,
    backoff: Arc<dyn Backoff>,
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
}

impl Persistency {
    pub fn new(store: Arc<dyn ObjectStore>, status: Arc<dyn StatusService>, config: FolioConfig) -> Self {
        Self {
            store,
            status,
            config,
            backoff: Arc::new(ThreadSleep::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// A service over a fresh in-memory store with the standard schema.
    pub fn in_memory(config: FolioConfig) -> Self {
        Self::new(
            Arc::new(InMemoryObjectStore::standard()),
            Arc::new(OperationalStatus::new()),
            config,
        )
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn status(&self) -> &Arc<dyn StatusService> {
        &self.status
    }

    pub fn config(&self) -> &FolioConfig {
        &self.config
    }

    // ---- Validators and listeners ----

    /// A built-in validator configured from this service's settings.
    pub fn validator(&self, kind: ValidatorKind) -> Arc<dyn ChangeListener> {
        kind.build(&self.config.validation)
    }

    /// The chain transactions get when none is requested.
    pub fn default_validators(&self) -> Vec<Arc<dyn ChangeListener>> {
        default_chain(&self.config.validation)
    }

    /// Register a listener notified by every transaction opened afterwards.
    pub fn register_listener(&self, listener: Arc<dyn ChangeListener>) -> TxnResult<()> {
        let mut listeners = self
            .listeners
            .write()
            .map_err(|e| TxnError::Store(StoreError::Lock(e.to_string())))?;
        info!(listener = listener.name(), "change listener registered");
        listeners.push(listener);
        Ok(())
    }

    pub fn listeners(&self) -> TxnResult<Vec<Arc<dyn ChangeListener>>> {
        self.listeners
            .read()
            .map(|l| l.clone())
            .map_err(|e| TxnError::Store(StoreError::Lock(e.to_string())))
    }

    // ---- Transactions ----

    /// Open a transaction guarded by the default validator chain.
    pub fn open_transaction(&self) -> TxnResult<Transaction> {
        self.open_transaction_with(self.default_validators())
    }

    /// Open a transaction guarded by `validators`, run in the given order.
    pub fn open_transaction_with(&self, validators: Vec<Arc<dyn ChangeListener>>) -> TxnResult<Transaction> {
        let listeners = self.listeners()?;
        Ok(Transaction::open(self.store.clone(), self.status.clone(), validators, listeners)?
            .with_retry(self.config.retry.clone())
            .with_backoff(self.backoff.clone()))
    }

    /// Open a transaction over the given validator kinds.
    pub fn open_transaction_for(&self, kinds: &[ValidatorKind]) -> TxnResult<Transaction> {
        let validators = kinds.iter().map(|kind| self.validator(*kind)).collect();
        self.open_transaction_with(validators)
    }

    /// Deactivate the underlying store.
    pub fn shutdown(&self) {
        info!("persistency shutting down");
        self.store.shutdown();
    }
}

impl fmt::Debug for Persistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persistency")
            .field("active", &self.store.is_active())
            .field("open_views", &self.store.open_views())
            .field("read_only", &self.status.is_read_only())
            .field("config", &self.config)
            .finish()
    }
}
