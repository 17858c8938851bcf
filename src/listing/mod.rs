//! Canonical listing model and the normalizer that produces it.
//!
//! Raw backend JSON stays untyped only until it reaches this module:
//! `envelope` finds the records in a response, `normalize` turns each one
//! into a `ListingRecord` using the key-priority lists in `lookup`.

pub mod envelope;
pub mod lookup;
pub mod normalize;
mod types;

pub use normalize::{normalize, normalize_detail, normalize_search_hit};
pub use types::{
  GeoPoint, Landlord, ListingDetail, ListingRecord, Page, SearchFilters, SearchHit, SortField,
  SortOrder,
};
