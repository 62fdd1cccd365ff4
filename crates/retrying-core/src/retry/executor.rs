//! Retry execution engine
//!
//! [`RetryExecutor::run`] drives a [`RecoveredOperation`] under a validated
//! [`RetryPolicy`] in one of two modes.
//!
//! ## Unbounded time (no `max_delay`)
//! ```text
//! for attempt in 1..=max_attempts {
//!   ├─► invoke ─► Ok  ──► Success
//!   │          └► Err ──► record; last attempt? ──► Exhausted
//!   └─► sleep(calculate_delay(policy))
//! }
//! ```
//!
//! ## Bounded time (`max_delay` set)
//! ```text
//!  producer task                          coordinator (caller)
//!  ─────────────                          ────────────────────
//!  invoke ─► send (attempt, result) ───►  select! (biased) {
//!  sleep(delay)                              result   ─► Success / record / Exhausted
//!  invoke ─► send ... ─────────────────►     deadline ─► TimedOut
//!                                          }
//!                          ◄── cancel ───  on return: cancel + join producer
//! ```
//!
//! ## Rules
//! - Results reach the coordinator strictly in attempt order.
//! - A result that is already available wins over the deadline.
//! - `TimedOut` discards the failures accumulated so far.
//! - The producer is torn down before `run` returns: an in-flight async
//!   attempt is dropped, an in-flight blocking closure is detached.
//! - No wait follows the final attempt.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::types::RetryPolicy;

use super::error::{AttemptErrors, AttemptFailure, RetryError, RunOutcome};
use super::observer::{NoOpObserver, RetryObserver};
use super::operation::Operation;
use super::recover::RecoveredOperation;
use super::strategies::calculate_delay;

type AttemptResult = (u32, Result<(), AttemptFailure>);

/// Execute an operation once under `policy`, recovering panics
///
/// This is a convenience function for simple retry scenarios. Use
/// [`Retryable`](super::Retryable) to collect configuration errors, or
/// [`RetryExecutor`] to attach an observer.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use retrying_core::retry::{retry_with_policy, AsyncFn};
/// use retrying_core::types::RetryPolicy;
///
/// async fn example() {
///     let policy = RetryPolicy {
///         max_attempts: 3,
///         wait_fixed: Duration::from_millis(200),
///         ..RetryPolicy::default()
///     };
///
///     let result = retry_with_policy(&policy, AsyncFn::new(|| async {
///         Ok::<_, std::io::Error>(())
///     }))
///     .await;
///     assert!(result.is_ok());
/// }
/// ```
pub async fn retry_with_policy<O: Operation>(
    policy: &RetryPolicy,
    operation: O,
) -> Result<(), RetryError> {
    let operation = RecoveredOperation::new(operation, policy.trace);
    RetryExecutor::new(policy.clone())
        .run(&operation)
        .await
        .into_result()
}

/// Runs a recovered operation according to a validated policy
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    observer: Arc<dyn RetryObserver>,
}

impl RetryExecutor {
    /// Create an executor that reports to no one
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            observer: Arc::new(NoOpObserver),
        }
    }

    /// Set the observer
    ///
    /// The observer receives callbacks during execution.
    pub fn with_observer(mut self, observer: impl RetryObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// The policy this executor applies
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the operation until success, exhaustion, or the deadline
    pub async fn run(&self, operation: &RecoveredOperation) -> RunOutcome {
        match self.policy.deadline() {
            Some(deadline) => self.run_with_deadline(operation, deadline).await,
            None => self.run_sequential(operation).await,
        }
    }

    async fn run_sequential(&self, operation: &RecoveredOperation) -> RunOutcome {
        let start = Instant::now();
        let max_attempts = self.policy.max_attempts;
        let mut failures = AttemptErrors::new();

        for attempt in 1..=max_attempts {
            self.observer.on_attempt_start(attempt, max_attempts);

            match operation.invoke().await {
                Ok(()) => {
                    self.observer.on_success(attempt, start.elapsed());
                    return RunOutcome::Success { attempts: attempt };
                }
                Err(failure) => {
                    if attempt >= max_attempts {
                        self.observer.on_exhausted(attempt, &failure);
                        failures.push(attempt, failure);
                        break;
                    }

                    let delay = calculate_delay(&self.policy);
                    self.observer.on_attempt_failed(attempt, &failure, delay);
                    failures.push(attempt, failure);

                    if !delay.is_zero() {
                        time::sleep(delay).await;
                    }
                }
            }
        }

        RunOutcome::Exhausted(failures)
    }

    async fn run_with_deadline(
        &self,
        operation: &RecoveredOperation,
        deadline: Duration,
    ) -> RunOutcome {
        let start = Instant::now();
        let max_attempts = self.policy.max_attempts;
        let (results_tx, mut results_rx) = mpsc::unbounded_channel::<AttemptResult>();
        let cancel = CancellationToken::new();

        let producer = tokio::spawn(produce_attempts(
            operation.clone(),
            self.policy.clone(),
            Arc::clone(&self.observer),
            results_tx,
            cancel.clone(),
        ));

        let timer = time::sleep(deadline);
        tokio::pin!(timer);
        let mut failures = AttemptErrors::new();

        let outcome = loop {
            select! {
                biased;
                received = results_rx.recv() => match received {
                    Some((attempt, Ok(()))) => {
                        self.observer.on_success(attempt, start.elapsed());
                        break RunOutcome::Success { attempts: attempt };
                    }
                    Some((attempt, Err(failure))) => {
                        let last = attempt >= max_attempts;
                        if last {
                            self.observer.on_exhausted(attempt, &failure);
                        }
                        failures.push(attempt, failure);
                        if last {
                            break RunOutcome::Exhausted(failures);
                        }
                    }
                    None => break RunOutcome::Exhausted(failures),
                },
                _ = &mut timer => {
                    self.observer.on_timeout(deadline, failures.len() as u32);
                    break RunOutcome::TimedOut { after: deadline };
                }
            }
        };

        cancel.cancel();
        drop(results_rx);
        if let Err(err) = producer.await {
            tracing::warn!(error = %err, "attempt task ended abnormally");
        }

        outcome
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Attempt loop of bounded-time mode
///
/// Stops after the first success, after `max_attempts` results, when the
/// coordinator hangs up, or when `cancel` fires.
async fn produce_attempts(
    operation: RecoveredOperation,
    policy: RetryPolicy,
    observer: Arc<dyn RetryObserver>,
    results: mpsc::UnboundedSender<AttemptResult>,
    cancel: CancellationToken,
) {
    let max_attempts = policy.max_attempts;

    for attempt in 1..=max_attempts {
        observer.on_attempt_start(attempt, max_attempts);

        let result = select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::trace!(attempt, "in-flight attempt abandoned");
                return;
            }
            result = operation.invoke() => result,
        };

        let succeeded = result.is_ok();
        let mut delay = Duration::ZERO;
        if let Err(failure) = &result {
            if attempt < max_attempts {
                delay = calculate_delay(&policy);
                observer.on_attempt_failed(attempt, failure, delay);
            }
        }

        if results.send((attempt, result)).is_err() || succeeded {
            return;
        }

        if !delay.is_zero() {
            select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = time::sleep(delay) => {}
            }
        }
    }
}
