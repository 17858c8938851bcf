//! Error taxonomy for the data access layer.

use thiserror::Error;

/// Failures surfaced by the listing data layer.
///
/// Callers are expected to tell "bad input" (`Validation`) apart from
/// "no data right now" (`Transient`/`Exhausted`).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataError {
  /// Bad caller input or an unusable payload. Never retried.
  #[error("validation failed: {0}")]
  Validation(String),

  /// The requested resource does not exist. Never retried.
  #[error("not found: {0}")]
  NotFound(String),

  /// Network, timeout, 5xx, 408 or 429. Retried up to the policy limit.
  #[error("transient failure{}: {message}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
  Transient {
    status: Option<u16>,
    message: String,
  },

  /// A client error other than 400/404 (auth, method, conflict...). Never retried.
  #[error("request rejected with status {status}: {message}")]
  Rejected { status: u16, message: String },

  /// Every attempt against every provider failed.
  #[error("all {attempts} attempts failed, last error: {last}")]
  Exhausted { attempts: u32, last: Box<DataError> },
}

pub type DataResult<T> = std::result::Result<T, DataError>;

impl DataError {
  pub fn validation(message: impl Into<String>) -> Self {
    Self::Validation(message.into())
  }

  pub fn transient(message: impl Into<String>) -> Self {
    Self::Transient {
      status: None,
      message: message.into(),
    }
  }

  /// Classify a non-success HTTP status.
  pub fn from_status(status: u16, context: &str) -> Self {
    match status {
      400 => Self::Validation(format!("{context}: backend rejected the request as malformed")),
      404 => Self::NotFound(context.to_string()),
      408 | 429 => Self::Transient {
        status: Some(status),
        message: context.to_string(),
      },
      s if s >= 500 => Self::Transient {
        status: Some(s),
        message: context.to_string(),
      },
      s => Self::Rejected {
        status: s,
        message: context.to_string(),
      },
    }
  }

  /// Whether the retry engine may try this failure again.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Transient { .. })
  }

  /// Whether a stale cache entry may be served in place of this failure.
  pub fn allows_stale_fallback(&self) -> bool {
    matches!(self, Self::Transient { .. } | Self::Exhausted { .. })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_classification() {
    assert!(matches!(DataError::from_status(400, "x"), DataError::Validation(_)));
    assert!(matches!(DataError::from_status(404, "x"), DataError::NotFound(_)));
    assert!(DataError::from_status(408, "x").is_retryable());
    assert!(DataError::from_status(429, "x").is_retryable());
    assert!(DataError::from_status(500, "x").is_retryable());
    assert!(DataError::from_status(503, "x").is_retryable());
    assert!(!DataError::from_status(401, "x").is_retryable());
    assert!(!DataError::from_status(403, "x").is_retryable());
    assert!(!DataError::from_status(400, "x").is_retryable());
    assert!(!DataError::from_status(404, "x").is_retryable());
  }

  #[test]
  fn test_stale_fallback_only_for_availability_failures() {
    let exhausted = DataError::Exhausted {
      attempts: 4,
      last: Box::new(DataError::transient("timeout")),
    };
    assert!(exhausted.allows_stale_fallback());
    assert!(!exhausted.is_retryable());
    assert!(!DataError::validation("bad").allows_stale_fallback());
    assert!(!DataError::NotFound("m1".into()).allows_stale_fallback());
  }

  #[test]
  fn test_display_includes_status() {
    let err = DataError::from_status(502, "list listings");
    assert_eq!(err.to_string(), "transient failure (status 502): list listings");
  }
}
