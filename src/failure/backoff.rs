//! Exponential backoff for retried checkpoints.

use crate::hooks::RetryPolicy;
use rand::Rng;
use std::time::Duration;

/// Delay before the retry that follows failed attempt `attempt` (1-based).
///
/// `min(base · multiplier^(attempt-1), max)`, without jitter.
pub fn base_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1) as i32;
    let raw = policy.base_delay_ms as f64 * policy.multiplier.powi(exponent);
    let capped = raw.min(policy.max_delay_ms as f64).max(0.0);
    Duration::from_millis(capped as u64)
}

/// `base_delay`, scaled by a random factor in [0.5, 1.0] when the policy enables jitter.
pub fn retry_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let delay = base_delay(policy, attempt);
    if policy.jitter {
        let factor = rand::rng().random_range(0.5..=1.0);
        delay.mul_f64(factor)
    } else {
        delay
    }
}
