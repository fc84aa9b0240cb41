use thiserror::Error;

/// Errors produced by schema lookups and value checks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown class: {0}")]
    UnknownClass(String),

    #[error("class {class} has no feature {feature}")]
    UnknownFeature { class: String, feature: String },

    #[error("class {0} is abstract and cannot be instantiated")]
    AbstractClass(String),

    #[error("feature {class}.{feature} expects {expected}, got {actual}")]
    KindMismatch {
        class: String,
        feature: String,
        expected: String,
        actual: String,
    },

    #[error("duplicate class definition: {0}")]
    DuplicateClass(String),
}
