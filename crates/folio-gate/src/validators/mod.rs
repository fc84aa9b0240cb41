//! Built-in validators.
//!
//! Each validator is a stateless [`ChangeListener`] enforcing one structural
//! rule. [`ValidatorKind`] is the catalog used to assemble a chain.

pub mod connection;
pub mod id;
pub mod name;
pub mod text_length;
pub mod top_level;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ValidationConfig;
use crate::listener::ChangeListener;

pub use connection::ConnectionValidator;
pub use id::IdValidator;
pub use name::NameValidator;
pub use text_length::TextLengthValidator;
pub use top_level::TopLevelFolderValidator;

/// Catalog of the built-in validators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    Id,
    Name,
    TextLength,
    Connection,
    TopLevelFolder,
}

impl ValidatorKind {
    pub const ALL: [ValidatorKind; 5] = [
        Self::Id,
        Self::Name,
        Self::TextLength,
        Self::Connection,
        Self::TopLevelFolder,
    ];

    /// The chain a transaction gets when none is supplied. The top-level
    /// folder rule is opt-in.
    pub const DEFAULT_CHAIN: [ValidatorKind; 4] =
        [Self::Id, Self::Name, Self::TextLength, Self::Connection];

    /// Rule name reported in validation errors.
    pub fn rule_name(&self) -> &'static str {
        match self {
            Self::Id => id::RULE,
            Self::Name => name::RULE,
            Self::TextLength => text_length::RULE,
            Self::Connection => connection::RULE,
            Self::TopLevelFolder => top_level::RULE,
        }
    }

    /// Instantiate the validator.
    pub fn build(&self, config: &ValidationConfig) -> Arc<dyn ChangeListener> {
        match self {
            Self::Id => Arc::new(IdValidator::new(config.clone())),
            Self::Name => Arc::new(NameValidator::new(config.clone())),
            Self::TextLength => Arc::new(TextLengthValidator::new(config.max_text_length)),
            Self::Connection => Arc::new(ConnectionValidator),
            Self::TopLevelFolder => Arc::new(TopLevelFolderValidator),
        }
    }
}

impl fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rule_name())
    }
}

impl FromStr for ValidatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.rule_name() == s)
            .ok_or_else(|| format!("unknown validator: {s}"))
    }
}

/// Build the default validator chain.
pub fn default_chain(config: &ValidationConfig) -> Vec<Arc<dyn ChangeListener>> {
    ValidatorKind::DEFAULT_CHAIN
        .iter()
        .map(|kind| kind.build(config))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_round_trips_names() {
        for kind in ValidatorKind::ALL {
            assert_eq!(kind.rule_name().parse::<ValidatorKind>(), Ok(kind));
        }
        assert!("bogus".parse::<ValidatorKind>().is_err());
    }

    #[test]
    fn default_chain_excludes_top_level_rule() {
        let chain = default_chain(&ValidationConfig::default());
        let names: Vec<&str> = chain.iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["id", "name", "text_length", "connection"]);
    }
}
