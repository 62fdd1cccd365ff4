//! Configuration loading and management

mod loader;
mod retry_config;

pub use loader::CONFIG_FILE_NAMES;
pub use retry_config::{RetryConfig, RetryPoliciesConfig, WaitRandomConfig, DEFAULT_POLICY_NAME};
