use folio_store::ObjectRef;
use folio_types::FeatureDef;

use crate::error::{ValidationError, ValidationResult};
use crate::event::{ChangeKind, FeatureChanged, ObjectCreated};
use crate::listener::ChangeListener;

pub const RULE: &str = "text_length";

/// Text attributes must stay within their maximum length, counted in
/// characters. Features without their own cap use the configured default.
pub struct TextLengthValidator {
    default_max: usize,
}

impl TextLengthValidator {
    pub fn new(default_max: usize) -> Self {
        Self { default_max }
    }

    fn limit(&self, def: &FeatureDef) -> usize {
        def.max_length.unwrap_or(self.default_max)
    }

    fn check(&self, object: ObjectRef<'_>, def: &FeatureDef, text: &str) -> ValidationResult<()> {
        let limit = self.limit(def);
        let len = text.chars().count();
        if len > limit {
            return Err(ValidationError::new(
                RULE,
                object,
                format!("{} is {len} characters long, the maximum is {limit}", def.name),
            ));
        }
        Ok(())
    }
}

impl ChangeListener for TextLengthValidator {
    fn name(&self) -> &str {
        RULE
    }

    fn on_object_created(&self, event: &ObjectCreated<'_>) -> ValidationResult<()> {
        let object = event.object;
        let Ok(defs) = object.schema().features_of(object.class()) else {
            return Ok(());
        };
        for def in defs.into_iter().filter(|d| d.is_text()) {
            if let Some(text) = object.text(&def.name) {
                self.check(object, def, text)?;
            }
        }
        Ok(())
    }

    fn on_feature_changed(&self, event: &FeatureChanged<'_>) -> ValidationResult<()> {
        if event.kind != ChangeKind::Set {
            return Ok(());
        }
        let object = event.object;
        let Ok(def) = object.schema().feature(object.class(), &event.feature) else {
            return Ok(());
        };
        match event.new.as_ref().and_then(|v| v.as_text()) {
            Some(text) if def.is_text() => self.check(object, def, text),
            _ => Ok(()),
        }
    }
}
