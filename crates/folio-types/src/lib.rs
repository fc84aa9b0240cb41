//! Foundation types for folio.
//!
//! This crate provides the identity, value, and schema types shared by every
//! other folio crate.
//!
//! # Key Types
//!
//! - [`Oid`]: Store-internal object identifier, stable for the object's lifetime
//! - [`Value`]: A literal or reference value held by a feature
//! - [`FeatureValue`]: Single- or many-valued feature content
//! - [`Schema`] / [`ClassDef`] / [`FeatureDef`]: Reflective class model used
//!   by views and validators

pub mod error;
pub mod oid;
pub mod schema;
pub mod value;

pub use error::TypeError;
pub use oid::Oid;
pub use schema::{classes, features, AttributeType, ClassDef, FeatureDef, FeatureKind, Schema};
pub use value::{FeatureValue, Value};
