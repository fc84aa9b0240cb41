//! Change validation for folio.
//!
//! Before a working view is committed its raw delta is decoded into a
//! [`ChangeSet`] of typed events (object created, object removed, feature
//! changed) and delivered to an ordered chain of [`ChangeListener`]s. The
//! built-in validators are listeners that reject structurally invalid
//! changes; the first rejection aborts the commit attempt.
//!
//! # Built-in validators
//!
//! | Kind | Rule |
//! |---|---|
//! | [`ValidatorKind::Id`] | ids are well formed and unique among siblings |
//! | [`ValidatorKind::Name`] | names are present and free of separators |
//! | [`ValidatorKind::TextLength`] | text attributes stay within their cap |
//! | [`ValidatorKind::Connection`] | cross references are live and well typed |
//! | [`ValidatorKind::TopLevelFolder`] | projects grow only through top-level folders |

pub mod config;
pub mod decoder;
pub mod error;
pub mod event;
pub mod listener;
pub mod validators;

pub use config::ValidationConfig;
pub use decoder::ChangeSet;
pub use error::{ValidationError, ValidationResult};
pub use event::{ChangeKind, EventValue, FeatureChanged, ObjectCreated, ObjectRemoved};
pub use listener::{AuditTrail, ChangeListener};
pub use validators::{
    default_chain, ConnectionValidator, IdValidator, NameValidator, TextLengthValidator,
    TopLevelFolderValidator, ValidatorKind,
};
