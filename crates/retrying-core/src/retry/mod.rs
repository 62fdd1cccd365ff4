//! Retry execution engine with panic recovery
//!
//! This module re-invokes a zero-argument operation until it succeeds, the
//! attempt budget is spent, or an overall deadline elapses.
//!
//! # Features
//!
//! - Fixed or uniformly random wait between attempts
//! - Optional overall deadline, raced against attempt completion
//! - Panics inside an attempt become ordinary failures carrying a trace
//! - Async closures and blocking closures alike
//! - Every configuration mistake reported at once, before any work
//! - Observable attempts via the `RetryObserver` trait
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use retrying_core::retry::{RetryError, Retryable, TracingObserver};
//!
//! async fn example() -> Result<(), RetryError> {
//!     Retryable::new()
//!         .max_attempt_times(3)
//!         .wait_fixed(Duration::from_millis(500))
//!         .observer(TracingObserver::new("ping"))
//!         .function(|| async {
//!             // Your fallible operation here
//!             Ok::<_, std::io::Error>(())
//!         })
//!         .run()
//!         .await
//! }
//! ```

mod builder;
mod error;
mod executor;
mod observer;
mod operation;
mod recover;
mod strategies;

pub use builder::Retryable;
pub use error::{
    AttemptError, AttemptErrors, AttemptFailure, BoxError, ConfigError, RetryError, RunOutcome,
};
pub use executor::{retry_with_policy, RetryExecutor};
pub use observer::{NoOpObserver, RetryObserver, RetryStats, StatsObserver, TracingObserver};
pub use operation::{AsyncFn, BlockingFn, Operation, OperationFuture, Outcome};
pub use recover::{reinstall_panic_hook, RecoveredOperation};
pub use strategies::calculate_delay;
