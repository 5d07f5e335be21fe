//! Configuration errors
//!
//! All configuration errors are fatal at startup.

use thiserror::Error;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required field is absent or empty
    #[error("{description} is missing (set '{field}')")]
    Missing {
        field: &'static str,
        description: &'static str,
    },

    /// A field is present but unusable
    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },

    /// The configuration file could not be read
    #[error("failed to read config '{path}': {reason}")]
    Io { path: String, reason: String },

    /// The configuration file is not valid JSON for the schema
    #[error("invalid config JSON: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn missing(field: &'static str, description: &'static str) -> Self {
        Self::Missing { field, description }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}
