//! Validated retry policy
//!
//! A [`RetryPolicy`] is only ever produced by the builder or by
//! [`RetryConfig::validate`](crate::config::RetryConfig::validate), so every
//! value reaching the executor already satisfies its invariants.

use std::time::Duration;

/// Default number of attempts (a single invocation, no retry)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;

/// Default number of bytes of trace text kept when an operation panics
pub const DEFAULT_STACK_SIZE: usize = 4096;

/// How much diagnostic data to capture when an operation panics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceOptions {
    /// Upper bound, in bytes, of the captured trace text
    pub buffer_size: usize,

    /// Also list every other thread currently running a recovered operation
    pub all_threads: bool,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_STACK_SIZE,
            all_threads: false,
        }
    }
}

/// Retry policy consumed by the executor
///
/// Invariants (enforced before construction):
/// - `max_attempts >= 1`
/// - `max_delay`, when set, is strictly positive
/// - `wait_random`, when set, satisfies `min < max`
/// - `trace.buffer_size > 0`
///
/// `wait_fixed` is `Duration::ZERO` when unset. A non-zero fixed wait takes
/// precedence over the random range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of invocations before giving up
    pub max_attempts: u32,

    /// Overall deadline for the whole run (`None` = no deadline)
    pub max_delay: Option<Duration>,

    /// Fixed delay between attempts
    pub wait_fixed: Duration,

    /// Bounds of a uniformly random delay between attempts, `[min, max)`
    pub wait_random: Option<(Duration, Duration)>,

    /// Panic diagnostics settings
    pub trace: TraceOptions,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_delay: None,
            wait_fixed: Duration::ZERO,
            wait_random: None,
            trace: TraceOptions::default(),
        }
    }
}

impl RetryPolicy {
    /// Returns the overall deadline when the policy runs in bounded-time mode
    #[inline]
    pub fn deadline(&self) -> Option<Duration> {
        self.max_delay.filter(|d| !d.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.max_delay, None);
        assert!(policy.wait_fixed.is_zero());
        assert!(policy.wait_random.is_none());
        assert_eq!(policy.trace.buffer_size, 4096);
        assert!(!policy.trace.all_threads);
    }

    #[test]
    fn test_deadline_ignores_zero() {
        let mut policy = RetryPolicy::default();
        assert_eq!(policy.deadline(), None);

        policy.max_delay = Some(Duration::ZERO);
        assert_eq!(policy.deadline(), None);

        policy.max_delay = Some(Duration::from_secs(1));
        assert_eq!(policy.deadline(), Some(Duration::from_secs(1)));
    }
}
