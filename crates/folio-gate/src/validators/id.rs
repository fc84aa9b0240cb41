use folio_store::ObjectRef;
use folio_types::features;

use crate::config::ValidationConfig;
use crate::error::{ValidationError, ValidationResult};
use crate::event::{ChangeKind, FeatureChanged, ObjectCreated};
use crate::listener::ChangeListener;

pub const RULE: &str = "id";

/// Check identifier text, returning the failure reason.
pub fn check_id(config: &ValidationConfig, id: Option<&str>) -> Result<(), String> {
    let Some(id) = id else {
        return Err("id is not set".into());
    };
    if id.is_empty() {
        return Err("id is empty".into());
    }
    if id.trim().is_empty() {
        return Err("id consists only of whitespace".into());
    }
    if let Some(bad) = id.chars().find(|c| !config.is_id_char(*c)) {
        return Err(format!("id {id:?} contains invalid character {bad:?}"));
    }
    Ok(())
}

/// Identifiers must be well formed and unique among siblings.
///
/// Uniqueness is scoped to the container feature: the same id may appear
/// anywhere else in the tree.
pub struct IdValidator {
    config: ValidationConfig,
}

impl IdValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    fn check(&self, object: ObjectRef<'_>) -> ValidationResult<()> {
        if !object.schema().has_feature(object.class(), features::ID) {
            return Ok(());
        }
        let id = object.text(features::ID);
        check_id(&self.config, id).map_err(|reason| ValidationError::new(RULE, object, reason))?;

        if let Some(id) = id {
            let duplicate = object
                .siblings()
                .into_iter()
                .find(|sibling| sibling.text(features::ID) == Some(id));
            if let Some(duplicate) = duplicate {
                let parent = object
                    .container()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "its container".into());
                return Err(ValidationError::new(
                    RULE,
                    object,
                    format!("id {id:?} is already used by {duplicate} in {parent}"),
                ));
            }
        }
        Ok(())
    }
}

impl ChangeListener for IdValidator {
    fn name(&self) -> &str {
        RULE
    }

    fn on_object_created(&self, event: &ObjectCreated<'_>) -> ValidationResult<()> {
        self.check(event.object)
    }

    fn on_feature_changed(&self, event: &FeatureChanged<'_>) -> ValidationResult<()> {
        match event.kind {
            ChangeKind::Set | ChangeKind::Unset if event.feature == features::ID => {
                self.check(event.object)
            }
            ChangeKind::Add => {
                let containment = event
                    .object
                    .schema()
                    .feature(event.object.class(), &event.feature)
                    .is_ok_and(|f| f.is_containment());
                match event.new.as_ref().and_then(|v| v.as_object()) {
                    Some(child) if containment => self.check(child),
                    _ => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use folio_types::classes::*;
    use folio_types::features::*;

    use super::*;
    use crate::validators::testkit::{commit, element, fixture, run};

    fn validator() -> IdValidator {
        IdValidator::new(ValidationConfig::default())
    }

    #[test]
    fn well_formed_id_is_accepted() {
        let mut fx = fixture();
        element(&mut fx.view, FOLDER, fx.top, "tEst_1-2");
        assert!(run(&fx.view, &validator()).is_ok());
    }

    #[test]
    fn malformed_ids_are_rejected() {
        for bad in ["test-!_case", "", " ", "with space", "dot.ted"] {
            let mut fx = fixture();
            element(&mut fx.view, FOLDER, fx.top, bad);
            let err = run(&fx.view, &validator()).unwrap_err();
            assert_eq!(err.rule, RULE, "id {bad:?}");
        }
    }

    #[test]
    fn missing_id_is_rejected() {
        let mut fx = fixture();
        let folder = fx.view.create(FOLDER).unwrap();
        fx.view.add(fx.top, CONTENTS, folder).unwrap();
        let err = run(&fx.view, &validator()).unwrap_err();
        assert_eq!(err.message, "id is not set");
    }

    #[test]
    fn duplicate_siblings_are_rejected() {
        let mut fx = fixture();
        element(&mut fx.view, FOLDER, fx.top, "child1");
        element(&mut fx.view, FOLDER, fx.top, "child1");
        let err = run(&fx.view, &validator()).unwrap_err();
        assert!(err.message.contains("already used"), "{err}");
    }

    #[test]
    fn same_id_under_different_parents_is_accepted() {
        let mut fx = fixture();
        let a = element(&mut fx.view, FOLDER, fx.top, "a");
        let b = element(&mut fx.view, FOLDER, fx.top, "b");
        element(&mut fx.view, FOLDER, a, "grandchild");
        element(&mut fx.view, FOLDER, b, "grandchild");
        assert!(run(&fx.view, &validator()).is_ok());
    }

    #[test]
    fn moving_into_a_clashing_folder_is_rejected() {
        let mut fx = fixture();
        let a = element(&mut fx.view, FOLDER, fx.top, "a");
        let b = element(&mut fx.view, FOLDER, fx.top, "b");
        element(&mut fx.view, FOLDER, a, "same");
        let mover = element(&mut fx.view, FOLDER, b, "same");
        commit(&mut fx);

        fx.view.add(a, CONTENTS, mover).unwrap();
        assert!(run(&fx.view, &validator()).is_err());
    }

    #[test]
    fn renaming_to_a_sibling_id_is_rejected() {
        let mut fx = fixture();
        element(&mut fx.view, FOLDER, fx.top, "one");
        let two = element(&mut fx.view, FOLDER, fx.top, "two");
        commit(&mut fx);

        fx.view.set(two, ID, "one").unwrap();
        assert!(run(&fx.view, &validator()).is_err());
        fx.view.set(two, ID, "three").unwrap();
        assert!(run(&fx.view, &validator()).is_ok());
    }

    proptest! {
        #[test]
        fn ids_from_the_allowed_set_pass(id in "[a-zA-Z0-9_-]{1,24}") {
            prop_assert!(check_id(&ValidationConfig::default(), Some(&id)).is_ok());
        }

        #[test]
        fn any_disallowed_character_fails(
            prefix in "[a-z0-9]{0,8}",
            bad in "[!@#$%^&*()+=. /;:,]",
            suffix in "[a-z0-9]{0,8}",
        ) {
            let id = format!("{prefix}{bad}{suffix}");
            prop_assert!(check_id(&ValidationConfig::default(), Some(&id)).is_err());
        }
    }
}
