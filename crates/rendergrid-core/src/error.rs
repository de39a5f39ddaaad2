//! Configuration and naming errors.

use thiserror::Error;

use crate::types::ErrorKind;

/// Result type alias for config parsing and name derivation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading configuration or deriving names.
///
/// All of these map to [`ErrorKind::InvalidConfig`]: bad input is never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("bad name pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl ConfigError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidConfig
    }
}
