//! Retry observation and logging
//!
//! This module provides the `RetryObserver` trait for monitoring a run and a
//! `TracingObserver` implementation that logs using the `tracing` crate.

use std::error::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::error::PANICKED;

/// Observer trait for retry lifecycle events
///
/// In bounded-time mode the attempt callbacks (`on_attempt_start`,
/// `on_attempt_failed`) fire on the background attempt task, so implementations
/// must be `Send + Sync`.
///
/// # Example
///
/// ```rust
/// use retrying_core::retry::RetryObserver;
/// use std::error::Error;
/// use std::time::Duration;
///
/// struct MetricsObserver;
///
/// impl RetryObserver for MetricsObserver {
///     fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {}
///
///     fn on_attempt_failed(&self, attempt: u32, error: &dyn Error, delay: Duration) {}
///
///     fn on_success(&self, attempt: u32, total_duration: Duration) {}
///
///     fn on_exhausted(&self, attempts: u32, final_error: &dyn Error) {}
/// }
/// ```
pub trait RetryObserver: Send + Sync {
    /// Attempt `attempt` (1-indexed) of at most `max_attempts` is starting
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32);

    /// Attempt `attempt` failed and the next one starts after `delay`
    fn on_attempt_failed(&self, attempt: u32, error: &dyn Error, delay: Duration);

    /// Attempt `attempt` succeeded, `total_duration` after the run began
    fn on_success(&self, attempt: u32, total_duration: Duration);

    /// Every one of `attempts` failed; `final_error` is the last failure
    fn on_exhausted(&self, attempts: u32, final_error: &dyn Error);

    /// The overall deadline elapsed after `failures_seen` failed attempts
    fn on_timeout(&self, deadline: Duration, failures_seen: u32) {
        let _ = (deadline, failures_seen);
    }
}

/// A no-op observer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn on_attempt_start(&self, _attempt: u32, _max_attempts: u32) {}

    fn on_attempt_failed(&self, _attempt: u32, _error: &dyn Error, _delay: Duration) {}

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {}

    fn on_exhausted(&self, _attempts: u32, _final_error: &dyn Error) {}
}

/// Logs each run of one named operation through `tracing`
///
/// Failed attempts that will be retried log at WARN, the final outcome at
/// ERROR (exhausted, timed out) or INFO (success after a retry). A first-try
/// success and attempt starts stay at DEBUG.
///
/// Panics are logged by message only; the captured trace goes to a separate
/// DEBUG event so retries do not flood the log.
///
/// ```rust
/// use retrying_core::retry::TracingObserver;
///
/// let observer = TracingObserver::new("fetch-manifest");
/// assert_eq!(observer.operation(), "fetch-manifest");
/// ```
#[derive(Debug, Clone)]
pub struct TracingObserver {
    operation: String,
}

impl TracingObserver {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    /// Name used as the `operation` field of every event
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Short form of a failure for one log line
    fn summary(&self, attempt: u32, error: &dyn Error) -> String {
        let message = error.to_string();
        match message.split_once('\n') {
            Some((head, trace)) if head.starts_with(PANICKED) => {
                tracing::debug!(operation = %self.operation, attempt, "panic trace:\n{}", trace);
                head.to_string()
            }
            _ => message,
        }
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new("retry")
    }
}

impl RetryObserver for TracingObserver {
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        tracing::debug!(operation = %self.operation, attempt, max_attempts, "attempt starting");
    }

    fn on_attempt_failed(&self, attempt: u32, error: &dyn Error, delay: Duration) {
        let error = self.summary(attempt, error);
        tracing::warn!(
            operation = %self.operation,
            attempt,
            retry_in_ms = delay.as_millis() as u64,
            "attempt failed: {}",
            error
        );
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        let elapsed_ms = total_duration.as_millis() as u64;
        if attempt == 1 {
            tracing::debug!(operation = %self.operation, elapsed_ms, "succeeded");
        } else {
            tracing::info!(operation = %self.operation, attempt, elapsed_ms, "succeeded after retrying");
        }
    }

    fn on_exhausted(&self, attempts: u32, final_error: &dyn Error) {
        let error = self.summary(attempts, final_error);
        tracing::error!(operation = %self.operation, attempts, "giving up: {}", error);
    }

    fn on_timeout(&self, deadline: Duration, failures_seen: u32) {
        tracing::error!(
            operation = %self.operation,
            deadline_ms = deadline.as_millis() as u64,
            failures_seen,
            "giving up: deadline elapsed"
        );
    }
}

/// Event counts seen by a [`StatsObserver`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryStats {
    pub attempt_starts: u32,
    /// Failures followed by a retry
    pub failures: u32,
    pub successes: u32,
    pub exhaustions: u32,
    pub timeouts: u32,
}

#[derive(Debug, Clone, Copy)]
enum Event {
    AttemptStart,
    Failure,
    Success,
    Exhaustion,
    Timeout,
}

/// An observer that counts lifecycle events
///
/// Useful for testing and metrics collection; read the counts with
/// [`StatsObserver::stats`].
#[derive(Debug, Default)]
pub struct StatsObserver {
    counts: [AtomicU32; 5],
}

impl StatsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the counts so far
    pub fn stats(&self) -> RetryStats {
        let count = |event: Event| self.counts[event as usize].load(Ordering::SeqCst);
        RetryStats {
            attempt_starts: count(Event::AttemptStart),
            failures: count(Event::Failure),
            successes: count(Event::Success),
            exhaustions: count(Event::Exhaustion),
            timeouts: count(Event::Timeout),
        }
    }

    fn record(&self, event: Event) {
        self.counts[event as usize].fetch_add(1, Ordering::SeqCst);
    }
}

impl RetryObserver for StatsObserver {
    fn on_attempt_start(&self, _attempt: u32, _max_attempts: u32) {
        self.record(Event::AttemptStart);
    }

    fn on_attempt_failed(&self, _attempt: u32, _error: &dyn Error, _delay: Duration) {
        self.record(Event::Failure);
    }

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {
        self.record(Event::Success);
    }

    fn on_exhausted(&self, _attempts: u32, _final_error: &dyn Error) {
        self.record(Event::Exhaustion);
    }

    fn on_timeout(&self, _deadline: Duration, _failures_seen: u32) {
        self.record(Event::Timeout);
    }
}

/// Forward every callback through a smart pointer
macro_rules! forward_observer {
    ($pointer:ident) => {
        impl<T: RetryObserver + ?Sized> RetryObserver for $pointer<T> {
            fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
                (**self).on_attempt_start(attempt, max_attempts)
            }

            fn on_attempt_failed(&self, attempt: u32, error: &dyn Error, delay: Duration) {
                (**self).on_attempt_failed(attempt, error, delay)
            }

            fn on_success(&self, attempt: u32, total_duration: Duration) {
                (**self).on_success(attempt, total_duration)
            }

            fn on_exhausted(&self, attempts: u32, final_error: &dyn Error) {
                (**self).on_exhausted(attempts, final_error)
            }

            fn on_timeout(&self, deadline: Duration, failures_seen: u32) {
                (**self).on_timeout(deadline, failures_seen)
            }
        }
    };
}

forward_observer!(Arc);
forward_observer!(Box);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::AttemptFailure;
    use std::io;

    #[test]
    fn test_noop_observer() {
        let observer = NoOpObserver;
        let error = io::Error::other("test");

        observer.on_attempt_start(1, 3);
        observer.on_attempt_failed(1, &error, Duration::from_millis(100));
        observer.on_success(2, Duration::from_millis(500));
        observer.on_exhausted(3, &error);
        observer.on_timeout(Duration::from_secs(1), 2);
    }

    #[test]
    fn test_stats_observer_exhaustion() {
        let observer = StatsObserver::new();
        let error = io::Error::other("test");

        observer.on_attempt_start(1, 3);
        observer.on_attempt_failed(1, &error, Duration::from_millis(100));
        observer.on_attempt_start(2, 3);
        observer.on_attempt_failed(2, &error, Duration::from_millis(200));
        observer.on_attempt_start(3, 3);
        observer.on_exhausted(3, &error);

        assert_eq!(
            observer.stats(),
            RetryStats {
                attempt_starts: 3,
                failures: 2,
                exhaustions: 1,
                ..RetryStats::default()
            }
        );
    }

    #[test]
    fn test_summary_drops_panic_trace() {
        let observer = TracingObserver::default();
        let panicked = AttemptFailure::Panicked {
            payload: "boom".to_string(),
            trace: "at frame 0\nat frame 1".to_string(),
        };
        assert_eq!(observer.summary(1, &panicked), "panicked: boom");

        let returned = AttemptFailure::Returned("line one\nline two".into());
        assert_eq!(observer.summary(1, &returned), "line one\nline two");
    }

    #[test]
    fn test_tracing_observer_creation() {
        let observer = TracingObserver::new("test_operation");
        assert_eq!(observer.operation, "test_operation");

        let default_observer = TracingObserver::default();
        assert_eq!(default_observer.operation, "retry");
    }

    #[test]
    fn test_arc_and_box_forward() {
        let stats = Arc::new(StatsObserver::new());
        let boxed: Box<dyn RetryObserver> = Box::new(stats.clone());

        boxed.on_attempt_start(1, 2);
        boxed.on_timeout(Duration::from_millis(10), 1);

        assert_eq!(stats.stats().attempt_starts, 1);
        assert_eq!(stats.stats().timeouts, 1);
    }
}
