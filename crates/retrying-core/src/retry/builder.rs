//! Chained retry configuration
//!
//! [`Retryable`] collects options and every configuration mistake before any
//! work is done. Nothing is invoked until [`Retryable::run`], and a builder
//! with errors never invokes its operation.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use retrying_core::retry::Retryable;
//!
//! async fn example() {
//!     let result = Retryable::new()
//!         .max_attempt_times(5)
//!         .wait_random(Duration::from_millis(100), Duration::from_millis(300))
//!         .max_delay(Duration::from_secs(10))
//!         .function(|| async { std::fs::metadata("/etc/hosts").map(|_| ()) })
//!         .run()
//!         .await;
//!
//!     if let Err(err) = result {
//!         eprintln!("{}", err);
//!     }
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::types::{RetryPolicy, TraceOptions};

use super::error::{ConfigError, RetryError, RunOutcome};
use super::executor::RetryExecutor;
use super::observer::RetryObserver;
use super::operation::{AsyncFn, BlockingFn, Operation, Outcome};
use super::recover::RecoveredOperation;

/// Builder for a retried operation
///
/// Every setter validates its own input and records a [`ConfigError`] per
/// violated rule; the value is stored either way. The recorded errors are
/// reported together by [`run`](Self::run) or [`into_parts`](Self::into_parts).
#[derive(Clone, Default)]
pub struct Retryable {
    policy: RetryPolicy,
    errors: Vec<ConfigError>,
    operation: Option<Arc<dyn Operation>>,
    observer: Option<Arc<dyn RetryObserver>>,
}

impl Retryable {
    /// Start from the default policy: one attempt, no wait, no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already validated policy
    pub fn from_policy(policy: RetryPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Record errors found outside the setters, such as in a policy file
    pub(crate) fn with_errors(mut self, errors: impl IntoIterator<Item = ConfigError>) -> Self {
        self.errors.extend(errors);
        self
    }

    /// Trace capture for panicking attempts
    ///
    /// `size` bounds the captured trace in bytes; `all_threads` adds the
    /// threads running other recovered attempts to the report.
    pub fn stack(mut self, size: usize, all_threads: bool) -> Self {
        if size == 0 {
            self.errors.push(ConfigError::StackSizeNotPositive);
        }
        self.policy.trace = TraceOptions {
            buffer_size: size,
            all_threads,
        };
        self
    }

    /// Maximum number of attempts, including the first one
    pub fn max_attempt_times(mut self, n: u32) -> Self {
        if n == 0 {
            self.errors.push(ConfigError::MaxAttemptsNotPositive);
        }
        self.policy.max_attempts = n;
        self
    }

    /// Overall deadline for the whole run
    pub fn max_delay(mut self, delay: Duration) -> Self {
        if delay.is_zero() {
            self.errors.push(ConfigError::MaxDelayNotPositive);
        }
        self.policy.max_delay = Some(delay);
        self
    }

    /// Constant wait between attempts; takes precedence over
    /// [`wait_random`](Self::wait_random)
    pub fn wait_fixed(mut self, wait: Duration) -> Self {
        if wait.is_zero() {
            self.errors.push(ConfigError::WaitFixedNotPositive);
        }
        self.policy.wait_fixed = wait;
        self
    }

    /// Wait drawn uniformly from `[min, max)` between attempts
    pub fn wait_random(mut self, min: Duration, max: Duration) -> Self {
        if min >= max {
            self.errors.push(ConfigError::WaitRandomInverted);
        }
        self.policy.wait_random = Some((min, max));
        self
    }

    /// Retry an async closure
    ///
    /// The closure must return a future resolving to `()` or to a
    /// `Result<T, E>` whose error converts into a boxed error.
    pub fn function<F, Fut>(self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Outcome,
    {
        self.operation(AsyncFn::new(f))
    }

    /// Retry a synchronous closure on the blocking thread pool
    pub fn blocking_function<F, R>(self, f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: Outcome + 'static,
    {
        self.operation(BlockingFn::new(f))
    }

    /// Retry any [`Operation`]
    pub fn operation(mut self, operation: impl Operation) -> Self {
        self.operation = Some(Arc::new(operation));
        self
    }

    /// Receive lifecycle callbacks while running
    pub fn observer(mut self, observer: impl RetryObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// The policy assembled so far
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Errors recorded so far, not counting a missing operation
    pub fn errors(&self) -> &[ConfigError] {
        &self.errors
    }

    /// Validate and split into the policy and the recovered operation
    pub fn into_parts(self) -> Result<(RetryPolicy, RecoveredOperation), Vec<ConfigError>> {
        self.prepare()
    }

    /// Run the operation under the configured policy
    ///
    /// Returns [`RetryError::InvalidConfig`] without invoking anything when a
    /// setter recorded an error or no operation was given.
    pub async fn run(&self) -> Result<(), RetryError> {
        let (policy, operation) = match self.prepare() {
            Ok(parts) => parts,
            Err(errors) => return RunOutcome::Invalid(errors).into_result(),
        };

        let mut executor = RetryExecutor::new(policy);
        if let Some(observer) = &self.observer {
            executor = executor.with_observer(Arc::clone(observer));
        }

        executor.run(&operation).await.into_result()
    }

    fn prepare(&self) -> Result<(RetryPolicy, RecoveredOperation), Vec<ConfigError>> {
        let mut errors = self.errors.clone();
        if self.operation.is_none() {
            errors.push(ConfigError::NoFunctionSpecified);
        }

        match &self.operation {
            Some(operation) if errors.is_empty() => Ok((
                self.policy.clone(),
                RecoveredOperation::from_arc(Arc::clone(operation), self.policy.trace),
            )),
            _ => Err(errors),
        }
    }
}

impl std::fmt::Debug for Retryable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retryable")
            .field("policy", &self.policy)
            .field("errors", &self.errors)
            .field("has_operation", &self.operation.is_some())
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let builder = Retryable::new();
        assert_eq!(builder.policy(), &RetryPolicy::default());
        assert!(builder.errors().is_empty());
    }

    #[test]
    fn test_each_setter_records_its_error() {
        let builder = Retryable::new()
            .stack(0, true)
            .max_attempt_times(0)
            .max_delay(Duration::ZERO)
            .wait_fixed(Duration::ZERO)
            .wait_random(Duration::from_millis(5), Duration::from_millis(5));

        assert_eq!(
            builder.errors(),
            &[
                ConfigError::StackSizeNotPositive,
                ConfigError::MaxAttemptsNotPositive,
                ConfigError::MaxDelayNotPositive,
                ConfigError::WaitFixedNotPositive,
                ConfigError::WaitRandomInverted,
            ]
        );
    }

    #[test]
    fn test_values_are_stored() {
        let builder = Retryable::new()
            .stack(128, true)
            .max_attempt_times(4)
            .max_delay(Duration::from_secs(2))
            .wait_fixed(Duration::from_millis(30))
            .wait_random(Duration::from_millis(10), Duration::from_millis(20));

        let policy = builder.policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.max_delay, Some(Duration::from_secs(2)));
        assert_eq!(policy.wait_fixed, Duration::from_millis(30));
        assert_eq!(
            policy.wait_random,
            Some((Duration::from_millis(10), Duration::from_millis(20)))
        );
        assert_eq!(policy.trace.buffer_size, 128);
        assert!(policy.trace.all_threads);
    }

    #[test]
    fn test_missing_function_is_reported_last() {
        let errors = Retryable::new().max_attempt_times(0).into_parts().unwrap_err();
        assert_eq!(
            errors,
            vec![
                ConfigError::MaxAttemptsNotPositive,
                ConfigError::NoFunctionSpecified
            ]
        );
    }

    #[test]
    fn test_into_parts_carries_trace_options() {
        let (policy, operation) = Retryable::new()
            .stack(64, false)
            .function(|| async {})
            .into_parts()
            .unwrap();

        assert_eq!(policy.trace.buffer_size, 64);
        assert_eq!(operation.trace_options(), policy.trace);
    }

    #[test]
    fn test_with_errors_blocks_run() {
        let builder = Retryable::new()
            .with_errors([ConfigError::WaitRandomNegative])
            .function(|| async {});
        assert_eq!(
            builder.into_parts().unwrap_err(),
            vec![ConfigError::WaitRandomNegative]
        );
    }
}
