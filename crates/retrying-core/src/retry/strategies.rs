//! Retry delay strategy
//!
//! Two delay shapes are supported: a fixed wait, and a wait drawn uniformly
//! from a `[min, max)` range. A non-zero fixed wait always wins.

use std::time::Duration;

use rand::Rng;

use crate::types::RetryPolicy;

/// Calculate the delay before the next attempt
///
/// - a non-zero `wait_fixed` is returned unchanged, whatever the random bounds;
/// - otherwise, if `wait_random` is set with `max > min`, a fresh value in
///   `[min, max)` is drawn on every call;
/// - otherwise the delay is zero.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use retrying_core::retry::calculate_delay;
/// use retrying_core::types::RetryPolicy;
///
/// let policy = RetryPolicy {
///     wait_fixed: Duration::from_millis(250),
///     wait_random: Some((Duration::from_secs(1), Duration::from_secs(2))),
///     ..RetryPolicy::default()
/// };
///
/// assert_eq!(calculate_delay(&policy), Duration::from_millis(250));
/// ```
pub fn calculate_delay(policy: &RetryPolicy) -> Duration {
    if !policy.wait_fixed.is_zero() {
        return policy.wait_fixed;
    }

    match policy.wait_random {
        Some((min, max)) if max > min => {
            let span = u64::try_from((max - min).as_nanos()).unwrap_or(u64::MAX);
            min + Duration::from_nanos(rand::rng().random_range(0..span))
        }
        _ => Duration::ZERO,
    }
}
