//! Error types for retrying-core

use thiserror::Error;

use crate::retry::ConfigError;

/// Result type alias using retrying-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading retry policy files
///
/// Run failures are reported separately through
/// [`RetryError`](crate::retry::RetryError).
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {message}")]
    InvalidConfig { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A policy in the file violates one or more rules
    #[error("Invalid retry policy '{name}': {}", join(.errors))]
    InvalidPolicy {
        name: String,
        errors: Vec<ConfigError>,
    },
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid policy error
    pub fn invalid_policy(name: impl Into<String>, errors: Vec<ConfigError>) -> Self {
        Self::InvalidPolicy {
            name: name.into(),
            errors,
        }
    }
}

fn join(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_policy_lists_errors() {
        let err = Error::invalid_policy(
            "deploy",
            vec![
                ConfigError::MaxAttemptsNotPositive,
                ConfigError::WaitRandomInverted,
            ],
        );
        assert_eq!(
            err.to_string(),
            "Invalid retry policy 'deploy': max attempt times must be positive integer; \
             wait random min must be smaller than max"
        );
    }

    #[test]
    fn test_config_not_found_message() {
        let err = Error::config_not_found("/tmp/missing.yaml");
        assert_eq!(
            err.to_string(),
            "Configuration file not found: /tmp/missing.yaml"
        );
    }
}
