//! Listing cache: TTL entries, stale reads for offline mode, durable snapshots.
//!
//! This module provides:
//! - A generic TTL map that keeps expired entries for last-resort stale reads
//! - Whole-map persistence to a durable blob slot, reloaded once at startup
//! - Deterministic keys derived from the query being cached

mod clock;
mod key;
mod storage;
mod store;
mod traits;

pub use key::ListingQueryKey;
pub use storage::{BlobStore, MemoryBlobStore, NoopBlobStore, SqliteBlobStore};
pub use store::CacheStore;
pub use traits::{CacheEntry, CacheResult, CacheSource, CacheStats};

#[cfg(test)]
pub(crate) use storage::testing;
