use std::fmt;

use serde::{Deserialize, Serialize};

use crate::oid::Oid;

/// A single value held by a feature.
///
/// Attributes hold literals; references hold the [`Oid`] of the target
/// object. Resolution of references to live objects is the job of the view.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Text(String),
    Ref(Oid),
}

impl Value {
    /// Convenience constructor for text values.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// The text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The referenced object, if this is a reference.
    pub fn as_ref_oid(&self) -> Option<Oid> {
        match self {
            Self::Ref(oid) => Some(*oid),
            _ => None,
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Text(_) => "text",
            Self::Ref(_) => "reference",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Ref(oid) => write!(f, "{oid}"),
        }
    }
}

impl From<Oid> for Value {
    fn from(oid: Oid) -> Self {
        Self::Ref(oid)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// The content of one feature slot on an object.
///
/// Unset single-valued features are simply absent from the object's feature
/// map; many-valued features are present as a (possibly empty) list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureValue {
    Single(Value),
    Many(Vec<Value>),
}

impl FeatureValue {
    /// The single value, if this slot is single-valued.
    pub fn as_single(&self) -> Option<&Value> {
        match self {
            Self::Single(v) => Some(v),
            Self::Many(_) => None,
        }
    }

    /// The list, if this slot is many-valued.
    pub fn as_many(&self) -> Option<&[Value]> {
        match self {
            Self::Single(_) => None,
            Self::Many(values) => Some(values),
        }
    }

    /// Iterate every value held by the slot regardless of multiplicity.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        let slice: &[Value] = match self {
            Self::Single(v) => std::slice::from_ref(v),
            Self::Many(values) => values,
        };
        slice.iter()
    }
}
