//! Retrying core library
//!
//! Re-invokes a fallible operation under a policy: an attempt limit, a fixed
//! or uniformly random wait between attempts, and an optional overall
//! deadline. Panics raised by the operation are caught and retried like any
//! other failure.
//!
//! - [`retry`] holds the engine and the [`Retryable`](retry::Retryable) builder
//! - [`config`] loads named policies from YAML files
//! - [`types`] defines the validated [`RetryPolicy`](types::RetryPolicy)

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use config::{RetryConfig, RetryPoliciesConfig};
pub use error::{Error, Result};
pub use retry::{RetryError, Retryable};
