//! HTTP-like transport capability consumed by the listings client.

mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::error::DataError;

/// Default request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request method. The listing queries are all reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
}

#[derive(Debug, Clone)]
pub struct TransportRequest {
  pub url: Url,
  pub method: Method,
  pub headers: BTreeMap<String, String>,
  pub timeout: Duration,
}

impl TransportRequest {
  pub fn get(url: Url) -> Self {
    Self {
      url,
      method: Method::Get,
      headers: BTreeMap::new(),
      timeout: DEFAULT_TIMEOUT,
    }
  }

  pub fn with_headers(mut self, headers: &BTreeMap<String, String>) -> Self {
    self
      .headers
      .extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }
}

/// Status plus decoded JSON body (`Null` when the body was empty).
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
  pub status: u16,
  pub body: Value,
}

impl TransportResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
  #[error("request timed out after {0:?}")]
  Timeout(Duration),
  #[error("request aborted: {0}")]
  Aborted(String),
  #[error("connection failed: {0}")]
  Connection(String),
  #[error("response body is not valid JSON: {0}")]
  InvalidBody(String),
}

impl From<TransportError> for DataError {
  fn from(err: TransportError) -> Self {
    DataError::transient(err.to_string())
  }
}

/// Performs one request. Implementations must honor `request.timeout` and
/// report elapsed deadlines as `TransportError::Timeout`.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn request(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}
