//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

use super::RetryPolicy;

/// Backoff before the `retry`-th retry (1-based), without jitter.
///
/// `base * factor^(retry - 1)`, capped at `max_delay`.
pub fn calculate_backoff(retry: u32, policy: &RetryPolicy) -> Duration {
  if retry == 0 {
    return Duration::ZERO;
  }

  let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
  let factor = policy.backoff_factor.max(1.0).powi(exponent);
  let delay_ms = policy.base_delay.as_millis() as f64 * factor;
  let capped_ms = delay_ms.min(policy.max_delay.as_millis() as f64);

  Duration::from_millis(capped_ms as u64)
}

/// Uniform random jitter in `[0, max_jitter]`.
pub fn jitter(max_jitter: Duration) -> Duration {
  let max_ms = max_jitter.as_millis() as u64;
  if max_ms == 0 {
    return Duration::ZERO;
  }
  Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}
