use folio_store::ObjectRef;
use folio_types::{FeatureDef, Oid};

use crate::error::{ValidationError, ValidationResult};
use crate::event::{ChangeKind, EventValue, FeatureChanged, ObjectCreated, ObjectRemoved};
use crate::listener::ChangeListener;

pub const RULE: &str = "connection";

/// Cross references must point at attached objects of a compatible class,
/// and required references must stay set.
///
/// Removing an object is rejected while a surviving object still needs it
/// through a required reference.
pub struct ConnectionValidator;

impl ConnectionValidator {
    fn check_target(
        owner: ObjectRef<'_>,
        def: &FeatureDef,
        target: Option<ObjectRef<'_>>,
        oid: Oid,
    ) -> ValidationResult<()> {
        let Some(target) = target else {
            return Err(ValidationError::new(
                RULE,
                owner,
                format!("{} references {oid}, which does not exist", def.name),
            ));
        };
        if let Some(expected) = def.target_class() {
            if !target.is_a(expected) {
                return Err(ValidationError::new(
                    RULE,
                    owner,
                    format!("{} must reference a {expected}, not {target}", def.name),
                ));
            }
        }
        Ok(())
    }
}

impl ChangeListener for ConnectionValidator {
    fn name(&self) -> &str {
        RULE
    }

    fn on_object_created(&self, event: &ObjectCreated<'_>) -> ValidationResult<()> {
        let object = event.object;
        let Ok(defs) = object.schema().features_of(object.class()) else {
            return Ok(());
        };
        for def in defs.into_iter().filter(|d| d.is_cross_reference()) {
            let targets: Vec<Oid> = object
                .get(&def.name)
                .into_iter()
                .flat_map(|v| v.values())
                .filter_map(|v| v.as_ref_oid())
                .collect();
            if def.required && targets.is_empty() {
                return Err(ValidationError::new(
                    RULE,
                    object,
                    format!("required reference {} is not set", def.name),
                ));
            }
            for oid in targets {
                Self::check_target(object, def, object.resolve(oid), oid)?;
            }
        }
        Ok(())
    }

    fn on_object_removed(&self, event: &ObjectRemoved<'_>) -> ValidationResult<()> {
        for (referrer, feature) in &event.referrers {
            let required = referrer
                .schema()
                .feature(referrer.class(), feature)
                .is_ok_and(|f| f.required);
            if required {
                return Err(ValidationError::new(
                    RULE,
                    *referrer,
                    format!("required reference {feature} still points at removed {event}"),
                ));
            }
        }
        Ok(())
    }

    fn on_feature_changed(&self, event: &FeatureChanged<'_>) -> ValidationResult<()> {
        let owner = event.object;
        let Ok(def) = owner.schema().feature(owner.class(), &event.feature) else {
            return Ok(());
        };
        if !def.is_cross_reference() {
            return Ok(());
        }
        match (event.kind, &event.new) {
            (ChangeKind::Set | ChangeKind::Add, Some(EventValue::Object(target))) => {
                Self::check_target(owner, def, Some(*target), target.oid())
            }
            (ChangeKind::Set | ChangeKind::Add, Some(EventValue::Dangling(oid))) => {
                Self::check_target(owner, def, None, *oid)
            }
            (ChangeKind::Unset, _) if def.required => Err(ValidationError::new(
                RULE,
                owner,
                format!("required reference {} cannot be unset", def.name),
            )),
            _ => Ok(()),
        }
    }
}
