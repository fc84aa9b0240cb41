//! Decoded change events handed to listeners and validators.

use std::fmt;

use serde::{Deserialize, Serialize};

use folio_store::{ObjectRecord, ObjectRef};
use folio_types::{Oid, Value};

/// Kind of a feature-level change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Add,
    Remove,
    Set,
    Unset,
    Move,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "ADD",
            Self::Remove => "REMOVE",
            Self::Set => "SET",
            Self::Unset => "UNSET",
            Self::Move => "MOVE",
        };
        f.write_str(s)
    }
}

/// A value carried by a change event.
///
/// References to attached objects arrive as live handles so listeners can
/// walk the graph; references that no longer resolve arrive as `Dangling`.
#[derive(Clone, Debug, PartialEq)]
pub enum EventValue<'a> {
    Literal(Value),
    Object(ObjectRef<'a>),
    Dangling(Oid),
    /// Former list position of a moved value.
    Position(usize),
}

impl<'a> EventValue<'a> {
    pub fn as_object(&self) -> Option<ObjectRef<'a>> {
        match self {
            Self::Object(obj) => Some(*obj),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Literal(v) => v.as_text(),
            _ => None,
        }
    }

    /// The referenced object identity, resolved or not.
    pub fn oid(&self) -> Option<Oid> {
        match self {
            Self::Object(obj) => Some(obj.oid()),
            Self::Dangling(oid) => Some(*oid),
            Self::Literal(v) => v.as_ref_oid(),
            Self::Position(_) => None,
        }
    }
}

impl fmt::Display for EventValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => write!(f, "{v}"),
            Self::Object(obj) => write!(f, "{obj}"),
            Self::Dangling(oid) => write!(f, "{oid} (missing)"),
            Self::Position(i) => write!(f, "#{i}"),
        }
    }
}

/// An object became reachable in this transaction.
#[derive(Clone, Debug)]
pub struct ObjectCreated<'a> {
    pub object: ObjectRef<'a>,
}

/// A committed object is no longer reachable.
#[derive(Clone, Debug)]
pub struct ObjectRemoved<'a> {
    pub oid: Oid,
    pub class: String,
    /// Committed version seen when the transaction opened.
    pub version: u64,
    /// The object's state as last committed.
    pub last_state: Option<&'a ObjectRecord>,
    /// Attached objects that still hold a cross reference to the removed
    /// object, with the referencing feature.
    pub referrers: Vec<(ObjectRef<'a>, String)>,
}

impl fmt::Display for ObjectRemoved<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.class, self.oid)
    }
}

/// One feature of a pre-existing object changed.
///
/// For `Add` and `Remove`, `index` is the list position; for `Move`, `old`
/// is the former [`EventValue::Position`] and `index` the new one.
#[derive(Clone, Debug)]
pub struct FeatureChanged<'a> {
    pub object: ObjectRef<'a>,
    pub feature: String,
    pub kind: ChangeKind,
    pub old: Option<EventValue<'a>>,
    pub new: Option<EventValue<'a>>,
    pub index: Option<usize>,
}

impl FeatureChanged<'_> {
    /// Returns `true` for changes that introduce a value.
    pub fn is_addition(&self) -> bool {
        matches!(self.kind, ChangeKind::Add | ChangeKind::Set)
    }
}

impl fmt::Display for FeatureChanged<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.kind, self.object, self.feature)?;
        if let Some(new) = &self.new {
            write!(f, " = {new}")?;
        }
        Ok(())
    }
}
