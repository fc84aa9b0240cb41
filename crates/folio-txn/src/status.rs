use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

/// Process-wide operational status consulted at commit time.
pub trait StatusService: Send + Sync {
    /// Returns `true` while the system is in maintenance mode.
    fn is_read_only(&self) -> bool;
}

/// Status flag toggled by whoever runs maintenance.
#[derive(Debug, Default)]
pub struct OperationalStatus {
    read_only: AtomicBool,
}

impl OperationalStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_read_only(&self, read_only: bool) {
        let previous = self.read_only.swap(read_only, Ordering::AcqRel);
        if previous != read_only {
            info!(read_only, "operational status changed");
        }
    }
}

impl StatusService for OperationalStatus {
    fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }
}
