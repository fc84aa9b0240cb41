use std::sync::Mutex;

use tracing::info;

use crate::error::ValidationResult;
use crate::event::{FeatureChanged, ObjectCreated, ObjectRemoved};

/// Observer of decoded change events.
///
/// Validators and plain listeners share this interface. Implementations
/// must not mutate the graph they inspect and must not keep state tied to a
/// single change set. Returning an error aborts the commit attempt.
pub trait ChangeListener: Send + Sync {
    /// Human-readable name, used as the rule name in validation errors.
    fn name(&self) -> &str;

    fn on_object_created(&self, _event: &ObjectCreated<'_>) -> ValidationResult<()> {
        Ok(())
    }

    fn on_object_removed(&self, _event: &ObjectRemoved<'_>) -> ValidationResult<()> {
        Ok(())
    }

    fn on_feature_changed(&self, _event: &FeatureChanged<'_>) -> ValidationResult<()> {
        Ok(())
    }
}

/// Listener that records a one-line description of every event it sees and
/// logs it at `info` level.
#[derive(Debug, Default)]
pub struct AuditTrail {
    entries: Mutex<Vec<String>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded entries, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    fn record(&self, entry: String) {
        info!(entry = %entry, "change observed");
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}

impl ChangeListener for AuditTrail {
    fn name(&self) -> &str {
        "audit"
    }

    fn on_object_created(&self, event: &ObjectCreated<'_>) -> ValidationResult<()> {
        self.record(format!("created {}", event.object));
        Ok(())
    }

    fn on_object_removed(&self, event: &ObjectRemoved<'_>) -> ValidationResult<()> {
        self.record(format!("removed {event}"));
        Ok(())
    }

    fn on_feature_changed(&self, event: &FeatureChanged<'_>) -> ValidationResult<()> {
        self.record(format!("changed {event}"));
        Ok(())
    }
}
