//! Wall-clock time that follows the tokio clock.
//!
//! Cache timestamps are `DateTime<Utc>` so snapshots survive restarts, but
//! expiry should move with `tokio::time` like the rest of the crate. `now`
//! shifts the system time by however far the runtime clock has drifted from
//! the monotonic clock: zero normally, the advanced amount under a paused
//! test runtime.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

pub fn now() -> DateTime<Utc> {
  let runtime = Instant::now().into_std();
  let real = std::time::Instant::now();
  let wall = Utc::now();

  if runtime >= real {
    wall + to_chrono(runtime - real)
  } else {
    wall - to_chrono(real - runtime)
  }
}

fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
  chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  fn close_to(actual: chrono::Duration, expected: chrono::Duration) -> bool {
    (actual - expected).num_milliseconds().abs() < 50
  }

  #[test]
  fn test_matches_system_time_outside_runtime() {
    assert!(close_to(now() - Utc::now(), chrono::Duration::zero()));
  }

  #[tokio::test(start_paused = true)]
  async fn test_follows_paused_runtime_clock() {
    let start = now();

    tokio::time::advance(Duration::from_secs(90)).await;

    assert!(close_to(now() - start, chrono::Duration::seconds(90)));
  }
}
