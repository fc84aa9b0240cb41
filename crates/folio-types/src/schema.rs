//! Reflective class model.
//!
//! Objects in a folio store are untyped records; the [`Schema`] tells views
//! and validators which features a class carries, whether a feature is an
//! attribute or a reference, whether it is many-valued, and whether a
//! reference is a containment.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::value::Value;

/// Names of the classes in [`Schema::standard`].
pub mod classes {
    pub const RESOURCE: &str = "Resource";
    pub const ELEMENT: &str = "Element";
    pub const FOLDER: &str = "Folder";
    pub const MODEL: &str = "Model";
    pub const NODE: &str = "Node";
    pub const CONNECTION: &str = "Connection";
}

/// Names of the features in [`Schema::standard`].
pub mod features {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const CONTENTS: &str = "contents";
    pub const SOURCE: &str = "source";
    pub const TARGET: &str = "target";
    pub const OUTGOING: &str = "outgoing";
    pub const INCOMING: &str = "incoming";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Bool,
    Int,
    Text,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Attribute(AttributeType),
    Reference { target: String, containment: bool },
}

/// Definition of one structural feature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDef {
    pub name: String,
    pub kind: FeatureKind,
    /// Many-valued features behave as identity sets.
    pub many: bool,
    /// Required features must be set on creation and may not be unset.
    pub required: bool,
    /// Per-feature cap for text attributes; `None` falls back to the
    /// validator's configured default.
    pub max_length: Option<usize>,
}

impl FeatureDef {
    fn new(name: &str, kind: FeatureKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            many: false,
            required: false,
            max_length: None,
        }
    }

    pub fn attribute(name: &str, ty: AttributeType) -> Self {
        Self::new(name, FeatureKind::Attribute(ty))
    }

    pub fn text(name: &str) -> Self {
        Self::attribute(name, AttributeType::Text)
    }

    /// A many-valued containment reference.
    pub fn containment(name: &str, target: &str) -> Self {
        Self {
            many: true,
            ..Self::new(
                name,
                FeatureKind::Reference {
                    target: target.to_string(),
                    containment: true,
                },
            )
        }
    }

    /// A single-valued cross reference.
    pub fn reference(name: &str, target: &str) -> Self {
        Self::new(
            name,
            FeatureKind::Reference {
                target: target.to_string(),
                containment: false,
            },
        )
    }

    pub fn many(mut self) -> Self {
        self.many = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.kind, FeatureKind::Reference { .. })
    }

    pub fn is_containment(&self) -> bool {
        matches!(self.kind, FeatureKind::Reference { containment: true, .. })
    }

    /// Non-containment references, i.e. the ones a connection check cares about.
    pub fn is_cross_reference(&self) -> bool {
        matches!(self.kind, FeatureKind::Reference { containment: false, .. })
    }

    pub fn is_text(&self) -> bool {
        self.kind == FeatureKind::Attribute(AttributeType::Text)
    }

    /// Target class of a reference feature.
    pub fn target_class(&self) -> Option<&str> {
        match &self.kind {
            FeatureKind::Reference { target, .. } => Some(target),
            FeatureKind::Attribute(_) => None,
        }
    }

    /// Returns `true` if `value` has the right shape for this feature.
    /// Reference targets are not type-checked here; that needs a live view.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (&self.kind, value),
            (FeatureKind::Attribute(AttributeType::Bool), Value::Bool(_))
                | (FeatureKind::Attribute(AttributeType::Int), Value::Int(_))
                | (FeatureKind::Attribute(AttributeType::Text), Value::Text(_))
                | (FeatureKind::Reference { .. }, Value::Ref(_))
        )
    }

    fn expected_kind(&self) -> &'static str {
        match &self.kind {
            FeatureKind::Attribute(AttributeType::Bool) => "bool",
            FeatureKind::Attribute(AttributeType::Int) => "int",
            FeatureKind::Attribute(AttributeType::Text) => "text",
            FeatureKind::Reference { .. } => "reference",
        }
    }
}

/// Definition of a class: its own features plus its supertypes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    pub supertypes: Vec<String>,
    pub is_abstract: bool,
    pub features: Vec<FeatureDef>,
}

impl ClassDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            supertypes: Vec::new(),
            is_abstract: false,
            features: Vec::new(),
        }
    }

    pub fn extends(mut self, supertype: &str) -> Self {
        self.supertypes.push(supertype.to_string());
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn feature(mut self, feature: FeatureDef) -> Self {
        self.features.push(feature);
        self
    }
}

/// Registry of class definitions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    classes: BTreeMap<String, ClassDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in project model: a resource holding folders, folders and
    /// models holding elements, and models holding nodes wired together by
    /// connections.
    pub fn standard() -> Self {
        use self::classes::*;
        use self::features::*;

        let mut schema = Self::new();
        for class in [
            ClassDef::new(RESOURCE).feature(FeatureDef::containment(CONTENTS, FOLDER)),
            ClassDef::new(ELEMENT)
                .abstract_class()
                .feature(FeatureDef::text(ID))
                .feature(FeatureDef::text(NAME))
                .feature(FeatureDef::text(DESCRIPTION)),
            ClassDef::new(FOLDER)
                .extends(ELEMENT)
                .feature(FeatureDef::containment(CONTENTS, ELEMENT)),
            ClassDef::new(MODEL)
                .extends(ELEMENT)
                .feature(FeatureDef::containment(CONTENTS, ELEMENT)),
            ClassDef::new(NODE)
                .extends(ELEMENT)
                .feature(FeatureDef::reference(OUTGOING, CONNECTION).many())
                .feature(FeatureDef::reference(INCOMING, CONNECTION).many()),
            ClassDef::new(CONNECTION)
                .extends(ELEMENT)
                .feature(FeatureDef::reference(SOURCE, NODE).required())
                .feature(FeatureDef::reference(TARGET, NODE).required()),
        ] {
            schema.classes.insert(class.name.clone(), class);
        }
        schema
    }

    /// Register a class. Supertypes must already be defined.
    pub fn define(&mut self, class: ClassDef) -> Result<(), TypeError> {
        if self.classes.contains_key(&class.name) {
            return Err(TypeError::DuplicateClass(class.name));
        }
        for supertype in &class.supertypes {
            if !self.classes.contains_key(supertype) {
                return Err(TypeError::UnknownClass(supertype.clone()));
            }
        }
        self.classes.insert(class.name.clone(), class);
        Ok(())
    }

    pub fn class(&self, name: &str) -> Result<&ClassDef, TypeError> {
        self.classes
            .get(name)
            .ok_or_else(|| TypeError::UnknownClass(name.to_string()))
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Class plus all its ancestors, nearest first, each listed once.
    fn lineage<'s>(&'s self, name: &str) -> Result<Vec<&'s ClassDef>, TypeError> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let class = self.class(&current)?;
            out.push(class);
            stack.extend(class.supertypes.iter().rev().cloned());
        }
        Ok(out)
    }

    /// All features of a class, inherited ones first, in declaration order.
    pub fn features_of(&self, class: &str) -> Result<Vec<&FeatureDef>, TypeError> {
        let lineage = self.lineage(class)?;
        Ok(lineage
            .into_iter()
            .rev()
            .flat_map(|c| c.features.iter())
            .collect())
    }

    /// Look up a feature on a class, walking supertypes.
    pub fn feature(&self, class: &str, feature: &str) -> Result<&FeatureDef, TypeError> {
        for def in self.lineage(class)? {
            if let Some(f) = def.features.iter().find(|f| f.name == feature) {
                return Ok(f);
            }
        }
        Err(TypeError::UnknownFeature {
            class: class.to_string(),
            feature: feature.to_string(),
        })
    }

    pub fn has_feature(&self, class: &str, feature: &str) -> bool {
        self.feature(class, feature).is_ok()
    }

    /// Returns `true` if `class` is `ancestor` or inherits from it.
    pub fn is_subclass(&self, class: &str, ancestor: &str) -> bool {
        self.lineage(class)
            .map(|lineage| lineage.iter().any(|c| c.name == ancestor))
            .unwrap_or(false)
    }

    /// Check that `class` exists and can be instantiated.
    pub fn check_instantiable(&self, class: &str) -> Result<(), TypeError> {
        if self.class(class)?.is_abstract {
            return Err(TypeError::AbstractClass(class.to_string()));
        }
        Ok(())
    }

    /// Check the shape of a value against a feature definition.
    pub fn check_value(&self, class: &str, feature: &str, value: &Value) -> Result<(), TypeError> {
        let def = self.feature(class, feature)?;
        if def.accepts(value) {
            Ok(())
        } else {
            Err(TypeError::KindMismatch {
                class: class.to_string(),
                feature: feature.to_string(),
                expected: def.expected_kind().to_string(),
                actual: value.kind_name().to_string(),
            })
        }
    }
}
