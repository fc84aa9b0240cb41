//! Waiting between commit attempts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{TxnError, TxnResult};

/// Strategy for waiting before a retry.
pub trait Backoff: Send + Sync {
    /// Block for `delay`. An interrupted wait fails with
    /// [`TxnError::Interrupted`].
    fn wait(&self, delay: Duration) -> TxnResult<()>;
}

/// Sleeps on the calling thread. When built with a cancel flag the sleep is
/// sliced so that raising the flag interrupts it.
#[derive(Clone, Debug, Default)]
pub struct ThreadSleep {
    cancel: Option<Arc<AtomicBool>>,
}

const SLICE: Duration = Duration::from_millis(10);

impl ThreadSleep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(cancel: Arc<AtomicBool>) -> Self {
        Self {
            cancel: Some(cancel),
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }
}

impl Backoff for ThreadSleep {
    fn wait(&self, delay: Duration) -> TxnResult<()> {
        if self.cancel.is_none() {
            thread::sleep(delay);
            return Ok(());
        }
        let deadline = Instant::now() + delay;
        loop {
            if self.cancelled() {
                return Err(TxnError::Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(SLICE));
        }
    }
}
