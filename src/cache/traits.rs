//! Core types shared by the cache and its callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached value with its lifetime bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub data: T,
  pub created_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
  /// Fresh entries are served by normal reads; expired ones only by stale reads.
  pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
    now < self.expires_at
  }
}

/// Introspection snapshot of the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
  pub size: usize,
  pub keys: Vec<String>,
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
    }
  }

  /// Create a new cache result from a fresh cache hit.
  pub fn from_cache(data: T) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from a provider
  Network,
  /// Data from cache, still within its TTL
  CacheFresh,
  /// Every provider failed, serving an expired cache entry
  Offline,
}
