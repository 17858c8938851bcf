//! Deterministic cache keys for listing queries.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::listing::SearchFilters;

/// Query key types for listing API calls.
#[derive(Clone, Debug)]
pub enum ListingQueryKey<'a> {
  /// One page of the listing feed
  Page { page: u32, limit: u32 },
  /// A single listing by id
  Detail { id: &'a str },
  /// A filtered search page
  Search {
    query: &'a str,
    filters: &'a SearchFilters,
    page: u32,
    limit: u32,
  },
}

impl ListingQueryKey<'_> {
  /// Stable cache key, e.g. `listings_2_20` or `search_wifi_3fa1..._1_20`.
  pub fn cache_key(&self) -> String {
    match self {
      Self::Page { page, limit } => format!("listings_{}_{}", page, limit),
      Self::Detail { id } => format!("detail_{}", id),
      Self::Search {
        query,
        filters,
        page,
        limit,
      } => format!(
        "search_{}_{}_{}_{}",
        normalize_query(query),
        filter_hash(filters),
        page,
        limit
      ),
    }
  }
}

impl fmt::Display for ListingQueryKey<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Page { page, limit } => write!(f, "listings page {} (limit {})", page, limit),
      Self::Detail { id } => write!(f, "listing {}", id),
      Self::Search { query, page, .. } => write!(f, "search '{}' page {}", query.trim(), page),
    }
  }
}

/// The query as sent to providers: trimmed, case preserved.
fn normalize_query(query: &str) -> String {
  query.trim().to_string()
}

/// Short SHA256 digest of the canonical filter encoding.
fn filter_hash(filters: &SearchFilters) -> String {
  let mut hasher = Sha256::new();
  hasher.update(filters.canonical_string().as_bytes());
  let digest = hex::encode(hasher.finalize());
  digest[..16].to_string()
}
