use std::fmt;

/// A validator (or listener) rejected the change set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{rule} rule violated by {object}: {message}")]
pub struct ValidationError {
    /// Name of the rule that failed.
    pub rule: String,
    /// Description of the offending object.
    pub object: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(rule: impl Into<String>, object: impl fmt::Display, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            object: object.to_string(),
            message: message.into(),
        }
    }
}

/// Result alias for listener callbacks.
pub type ValidationResult<T> = Result<T, ValidationError>;
