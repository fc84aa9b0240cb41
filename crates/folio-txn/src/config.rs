//! Runtime configuration, loadable from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use folio_gate::ValidationConfig;

/// Errors raised while loading a [`FolioConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Retry policy for commit conflicts.
///
/// The wait before attempt `n + 1` is `n * base_delay_ms`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first. Zero behaves as one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 50,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_base_delay_ms(mut self, delay_ms: u64) -> Self {
        self.base_delay_ms = delay_ms;
        self
    }

    /// The wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(u64::from(attempt)))
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolioConfig {
    pub retry: RetryConfig,
    pub validation: ValidationConfig,
}

impl FolioConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn linear_backoff() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for(1), Duration::from_millis(50));
        assert_eq!(retry.delay_for(9), Duration::from_millis(450));
        assert_eq!(RetryConfig::default().with_max_attempts(0).attempts(), 1);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = FolioConfig::from_toml_str(
            r#"
            [retry]
            max_attempts = 3

            [validation]
            max_text_length = 80
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 50);
        assert_eq!(config.validation.max_text_length, 80);
        assert_eq!(config.validation.id_extra_chars, vec!['_', '-']);
    }

    #[test]
    fn empty_source_is_default() {
        assert_eq!(FolioConfig::from_toml_str("").unwrap(), FolioConfig::default());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[retry]\nbase_delay_ms = 5").unwrap();
        let config = FolioConfig::load(file.path()).unwrap();
        assert_eq!(config.retry.base_delay_ms, 5);
        assert_eq!(config.retry.max_attempts, 10);
    }

    #[test]
    fn load_reports_bad_input() {
        assert!(matches!(
            FolioConfig::load("/definitely/not/here.toml"),
            Err(ConfigError::Io(_))
        ));
        assert!(matches!(
            FolioConfig::from_toml_str("[retry]\nmax_attempts = \"ten\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn printed_config_parses_back() {
        let config = FolioConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(FolioConfig::from_toml_str(&text).unwrap(), config);
    }
}
