//! Resilient multi-provider data access for student housing listings.
//!
//! [`ListingsClient`] is the entry point: it reads through a TTL cache,
//! fetches from a primary provider with failover to fallbacks, retries
//! transient failures with backoff, and normalizes every backend's payloads
//! into [`ListingRecord`]s.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod listing;
pub mod logging;
pub mod provider;
pub mod retry;
pub mod transport;

pub use cache::{CacheResult, CacheSource, CacheStats};
pub use client::{CacheTtls, ListingsClient};
pub use config::Config;
pub use error::{DataError, DataResult};
pub use listing::{ListingDetail, ListingRecord, Page, SearchFilters, SearchHit};
pub use provider::{ProviderDescriptor, ProviderRegistry, ProviderStatus};
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, Transport};
