//! Retry policies as written in configuration files

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::{ConfigError, Retryable};
use crate::types::{RetryPolicy, TraceOptions, DEFAULT_MAX_ATTEMPTS, DEFAULT_STACK_SIZE};

/// Name of the fallback policy in diagnostics
pub const DEFAULT_POLICY_NAME: &str = "default";

/// Retry policy configurations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPoliciesConfig {
    /// Policy used when no named policy matches
    #[serde(default)]
    pub default: RetryConfig,

    /// Per-operation retry policies
    #[serde(default)]
    pub operations: BTreeMap<String, RetryConfig>,
}

impl RetryPoliciesConfig {
    /// Get the policy for `name`, falling back to the default policy
    pub fn policy(&self, name: &str) -> &RetryConfig {
        self.operations.get(name).unwrap_or(&self.default)
    }

    /// Check whether `name` is defined, either as an operation or as `default`
    pub fn defines(&self, name: &str) -> bool {
        name == DEFAULT_POLICY_NAME || self.operations.contains_key(name)
    }

    /// Validate the policy for `name` (or the default policy)
    pub fn resolve(&self, name: Option<&str>) -> Result<RetryPolicy> {
        let (label, config) = match name {
            Some(name) => (name, self.policy(name)),
            None => (DEFAULT_POLICY_NAME, &self.default),
        };
        config
            .validate()
            .map_err(|errors| Error::invalid_policy(label, errors))
    }

    /// Every policy that fails validation, default first
    pub fn invalid_policies(&self) -> Vec<(String, Vec<ConfigError>)> {
        std::iter::once((DEFAULT_POLICY_NAME, &self.default))
            .chain(self.operations.iter().map(|(n, c)| (n.as_str(), c)))
            .filter_map(|(name, config)| {
                config
                    .validate()
                    .err()
                    .map(|errors| (name.to_string(), errors))
            })
            .collect()
    }
}

/// One retry policy
///
/// Durations are signed milliseconds so that negative values can be reported
/// instead of failing to parse. Unset optional fields are simply not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RetryConfig {
    /// Maximum number of attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    /// Overall deadline in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<i64>,

    /// Fixed wait between attempts in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_fixed_ms: Option<i64>,

    /// Random wait between attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_random_ms: Option<WaitRandomConfig>,

    /// Bytes of panic trace to keep
    #[serde(default = "default_stack_size")]
    pub stack_size: i64,

    /// Report other threads running recovered operations on panic
    #[serde(default)]
    pub all_threads: bool,
}

/// Bounds of a random wait, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitRandomConfig {
    pub min: i64,
    pub max: i64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_delay_ms: None,
            wait_fixed_ms: None,
            wait_random_ms: None,
            stack_size: default_stack_size(),
            all_threads: false,
        }
    }
}

fn default_max_attempts() -> i64 {
    i64::from(DEFAULT_MAX_ATTEMPTS)
}

fn default_stack_size() -> i64 {
    DEFAULT_STACK_SIZE as i64
}

impl RetryConfig {
    /// Check every field, returning the policy or all violations in field order
    pub fn validate(&self) -> std::result::Result<RetryPolicy, Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.stack_size <= 0 {
            errors.push(ConfigError::StackSizeNotPositive);
        }
        if self.max_attempts <= 0 {
            errors.push(ConfigError::MaxAttemptsNotPositive);
        }
        if matches!(self.max_delay_ms, Some(ms) if ms <= 0) {
            errors.push(ConfigError::MaxDelayNotPositive);
        }
        if matches!(self.wait_fixed_ms, Some(ms) if ms <= 0) {
            errors.push(ConfigError::WaitFixedNotPositive);
        }
        if let Some(WaitRandomConfig { min, max }) = self.wait_random_ms {
            if min < 0 || max < 0 {
                errors.push(ConfigError::WaitRandomNegative);
            }
            if min >= max {
                errors.push(ConfigError::WaitRandomInverted);
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(RetryPolicy {
            max_attempts: u32::try_from(self.max_attempts).unwrap_or(u32::MAX),
            max_delay: self.max_delay_ms.map(millis),
            wait_fixed: self.wait_fixed_ms.map(millis).unwrap_or_default(),
            wait_random: self.wait_random_ms.map(|w| (millis(w.min), millis(w.max))),
            trace: TraceOptions {
                buffer_size: usize::try_from(self.stack_size).unwrap_or(usize::MAX),
                all_threads: self.all_threads,
            },
        })
    }

    /// Start a [`Retryable`] from this policy
    ///
    /// Validation errors are carried into the builder, so running it reports
    /// them without invoking the operation.
    pub fn to_builder(&self) -> Retryable {
        match self.validate() {
            Ok(policy) => Retryable::from_policy(policy),
            Err(errors) => Retryable::new().with_errors(errors),
        }
    }
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let policy = RetryConfig::default().validate().unwrap();
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn test_parse_full_policy() {
        let yaml = r#"
max-attempts: 5
max-delay-ms: 2000
wait-random-ms:
  min: 100
  max: 300
stack-size: 1024
all-threads: true
"#;
        let config: RetryConfig = serde_yaml_ng::from_str(yaml).unwrap();
        let policy = config.validate().unwrap();

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.max_delay, Some(Duration::from_secs(2)));
        assert_eq!(policy.wait_fixed, Duration::ZERO);
        assert_eq!(
            policy.wait_random,
            Some((Duration::from_millis(100), Duration::from_millis(300)))
        );
        assert_eq!(policy.trace.buffer_size, 1024);
        assert!(policy.trace.all_threads);
    }

    #[test]
    fn test_every_violation_reported() {
        let config = RetryConfig {
            max_attempts: -1,
            max_delay_ms: Some(0),
            wait_fixed_ms: Some(-5),
            wait_random_ms: Some(WaitRandomConfig { min: -10, max: -20 }),
            stack_size: 0,
            all_threads: false,
        };

        assert_eq!(
            config.validate().unwrap_err(),
            vec![
                ConfigError::StackSizeNotPositive,
                ConfigError::MaxAttemptsNotPositive,
                ConfigError::MaxDelayNotPositive,
                ConfigError::WaitFixedNotPositive,
                ConfigError::WaitRandomNegative,
                ConfigError::WaitRandomInverted,
            ]
        );
    }

    #[test]
    fn test_negative_min_only() {
        let config = RetryConfig {
            wait_random_ms: Some(WaitRandomConfig { min: -1, max: 10 }),
            ..RetryConfig::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            vec![ConfigError::WaitRandomNegative]
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: std::result::Result<RetryConfig, _> =
            serde_yaml_ng::from_str("max-attempt: 3\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_falls_back_to_default() {
        let yaml = r#"
default:
  max-attempts: 2
operations:
  deploy:
    max-attempts: 7
    wait-fixed-ms: 50
"#;
        let config: RetryPoliciesConfig = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(config.policy("deploy").max_attempts, 7);
        assert_eq!(config.policy("unknown").max_attempts, 2);
        assert!(config.defines("deploy"));
        assert!(config.defines("default"));
        assert!(!config.defines("unknown"));
        assert_eq!(config.resolve(Some("unknown")).unwrap().max_attempts, 2);
        assert_eq!(
            config.resolve(Some("deploy")).unwrap().wait_fixed,
            Duration::from_millis(50)
        );
    }

    #[test]
    fn test_resolve_names_the_invalid_policy() {
        let mut config = RetryPoliciesConfig::default();
        config.operations.insert(
            "upload".to_string(),
            RetryConfig {
                max_attempts: 0,
                ..RetryConfig::default()
            },
        );

        match config.resolve(Some("upload")) {
            Err(Error::InvalidPolicy { name, errors }) => {
                assert_eq!(name, "upload");
                assert_eq!(errors, vec![ConfigError::MaxAttemptsNotPositive]);
            }
            other => panic!("expected InvalidPolicy, got {:?}", other),
        }
        assert_eq!(config.invalid_policies().len(), 1);
    }

    #[test]
    fn test_to_builder_carries_errors() {
        let config = RetryConfig {
            wait_fixed_ms: Some(0),
            ..RetryConfig::default()
        };
        let builder = config.to_builder();
        assert_eq!(builder.errors(), &[ConfigError::WaitFixedNotPositive]);
    }
}
