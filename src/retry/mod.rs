//! Retry engine with provider failover.
//!
//! # Responsibilities
//! - Run one logical request against the best eligible provider
//! - Classify each failure (see `DataError::is_retryable`)
//! - Report failures to the registry and re-select a provider before retrying
//! - Sleep with exponential backoff + jitter between attempts
//!
//! Backoff sleeps suspend only the calling request.

pub mod backoff;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{DataError, DataResult};
use crate::provider::{ProviderDescriptor, ProviderRegistry};

/// Bounds and pacing for retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
  pub max_retries: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
  pub backoff_factor: f64,
  pub max_jitter: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay: Duration::from_millis(1000),
      max_delay: Duration::from_millis(10_000),
      backoff_factor: 2.0,
      max_jitter: Duration::from_millis(1000),
    }
  }
}

/// One failed attempt that was followed by a retry.
#[derive(Debug, Clone)]
pub struct RetryAttempt {
  /// 1-based retry number
  pub attempt_index: u32,
  pub provider: String,
  /// Exponential component of the delay
  pub backoff: Duration,
  /// Backoff plus jitter, the time actually slept
  pub delay_applied: Duration,
  pub classified_error: DataError,
}

/// Successful result plus the retries it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
  pub value: T,
  pub provider: String,
  pub retries: Vec<RetryAttempt>,
}

#[derive(Debug, Clone, Default)]
pub struct RetryEngine {
  policy: RetryPolicy,
}

impl RetryEngine {
  pub fn new(policy: RetryPolicy) -> Self {
    Self { policy }
  }

  pub fn policy(&self) -> &RetryPolicy {
    &self.policy
  }

  /// Run `operation` until it succeeds, fails with a non-retryable error, or
  /// exhausts `max_retries`. Exhaustion yields `DataError::Exhausted` wrapping
  /// the last classified failure.
  pub async fn run<T, F, Fut>(
    &self,
    registry: &ProviderRegistry,
    mut operation: F,
  ) -> DataResult<RetryOutcome<T>>
  where
    F: FnMut(Arc<ProviderDescriptor>) -> Fut,
    Fut: Future<Output = DataResult<T>>,
  {
    let mut retries = Vec::new();

    loop {
      let provider = registry.best_eligible();

      let err = match operation(Arc::clone(&provider)).await {
        Ok(value) => {
          registry.mark_success(&provider.name);
          return Ok(RetryOutcome {
            value,
            provider: provider.name.clone(),
            retries,
          });
        }
        Err(err) if !err.is_retryable() => {
          debug!(provider = %provider.name, error = %err, "Non-retryable failure");
          return Err(err);
        }
        Err(err) => err,
      };

      registry.mark_failure(&provider.name, &err.to_string());

      let retry = retries.len() as u32 + 1;
      if retry > self.policy.max_retries {
        return Err(DataError::Exhausted {
          attempts: retry,
          last: Box::new(err),
        });
      }

      let backoff = backoff::calculate_backoff(retry, &self.policy);
      let delay = backoff + backoff::jitter(self.policy.max_jitter);
      warn!(
        provider = %provider.name,
        error = %err,
        retry,
        delay_ms = delay.as_millis() as u64,
        "Request failed; retrying"
      );
      retries.push(RetryAttempt {
        attempt_index: retry,
        provider: provider.name.clone(),
        backoff,
        delay_applied: delay,
        classified_error: err,
      });

      tokio::time::sleep(delay).await;
    }
  }
}
