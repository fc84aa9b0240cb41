use folio_store::ObjectRef;
use folio_types::features;

use crate::config::ValidationConfig;
use crate::error::{ValidationError, ValidationResult};
use crate::event::{ChangeKind, FeatureChanged, ObjectCreated};
use crate::listener::ChangeListener;

pub const RULE: &str = "name";

/// Check display-name text, returning the failure reason.
pub fn check_name(config: &ValidationConfig, name: Option<&str>) -> Result<(), String> {
    let Some(name) = name else {
        return Err("name is not set".into());
    };
    if name.trim().is_empty() {
        return Err("name is empty".into());
    }
    if let Some(bad) = name.chars().find(|c| config.is_forbidden_in_name(*c)) {
        return Err(format!("name {name:?} contains forbidden character {bad:?}"));
    }
    Ok(())
}

/// Display names must be present, non-blank and free of separator
/// characters.
pub struct NameValidator {
    config: ValidationConfig,
}

impl NameValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    fn check(&self, object: ObjectRef<'_>) -> ValidationResult<()> {
        if !object.schema().has_feature(object.class(), features::NAME) {
            return Ok(());
        }
        check_name(&self.config, object.text(features::NAME))
            .map_err(|reason| ValidationError::new(RULE, object, reason))
    }
}

impl ChangeListener for NameValidator {
    fn name(&self) -> &str {
        RULE
    }

    fn on_object_created(&self, event: &ObjectCreated<'_>) -> ValidationResult<()> {
        self.check(event.object)
    }

    fn on_feature_changed(&self, event: &FeatureChanged<'_>) -> ValidationResult<()> {
        match event.kind {
            ChangeKind::Set | ChangeKind::Unset if event.feature == features::NAME => {
                self.check(event.object)
            }
            _ => Ok(()),
        }
    }
}
