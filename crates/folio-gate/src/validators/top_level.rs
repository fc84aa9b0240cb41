use folio_types::Oid;

use crate::error::{ValidationError, ValidationResult};
use crate::event::{ChangeKind, FeatureChanged};
use crate::listener::ChangeListener;

pub const RULE: &str = "top_level_folder";

/// Projects (folders held directly by the root resource) only receive new
/// children through their top-level folders, never directly.
pub struct TopLevelFolderValidator;

impl ChangeListener for TopLevelFolderValidator {
    fn name(&self) -> &str {
        RULE
    }

    fn on_feature_changed(&self, event: &FeatureChanged<'_>) -> ValidationResult<()> {
        if event.kind != ChangeKind::Add {
            return Ok(());
        }
        let owner = event.object;
        let containment = owner
            .schema()
            .feature(owner.class(), &event.feature)
            .is_ok_and(|f| f.is_containment());
        let is_project = owner.container().is_some_and(|c| c.oid() == Oid::ROOT);
        if containment && is_project {
            let child = event
                .new
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_default();
            return Err(ValidationError::new(
                RULE,
                owner,
                format!("{child} must be added to a top-level folder, not to the project"),
            ));
        }
        Ok(())
    }
}
