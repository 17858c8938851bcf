//! Canonical listing types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DataError, DataResult};

/// A single accommodation listing, independent of which provider returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
  pub id: String,
  pub name: String,
  pub description: Option<String>,
  pub address: String,
  /// Never negative; 0 when the source had no usable price
  pub price: f64,
  pub amenities: Vec<String>,
  pub images: Vec<String>,
  pub contact_phone: Option<String>,
  pub contact_email: Option<String>,
  pub is_active: bool,
  pub geolocation: Option<GeoPoint>,
  pub created_at: Option<DateTime<Utc>>,
  pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
  pub lat: f64,
  pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Landlord {
  pub id: Option<String>,
  pub name: Option<String>,
  pub phone: Option<String>,
  pub email: Option<String>,
}

/// Listing as shown on a detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDetail {
  #[serde(flatten)]
  pub record: ListingRecord,
  pub landlord: Option<Landlord>,
  pub view_count: Option<u64>,
  pub contact_count: Option<u64>,
}

/// Listing returned by a search, with ranking metadata when the backend sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
  #[serde(flatten)]
  pub record: ListingRecord,
  pub relevance_score: Option<f64>,
  pub distance: Option<f64>,
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
  pub items: Vec<T>,
  pub total: u64,
  pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
  Price,
  Name,
  CreatedAt,
  Relevance,
  Distance,
}

impl SortField {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Price => "price",
      Self::Name => "name",
      Self::CreatedAt => "created_at",
      Self::Relevance => "relevance",
      Self::Distance => "distance",
    }
  }
}

impl FromStr for SortField {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "price" => Ok(Self::Price),
      "name" => Ok(Self::Name),
      "created_at" | "createdat" | "newest" => Ok(Self::CreatedAt),
      "relevance" => Ok(Self::Relevance),
      "distance" => Ok(Self::Distance),
      other => Err(format!("unknown sort field: {}", other)),
    }
  }
}

impl fmt::Display for SortField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
  Asc,
  Desc,
}

impl SortOrder {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Asc => "asc",
      Self::Desc => "desc",
    }
  }
}

impl FromStr for SortOrder {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "asc" | "ascending" => Ok(Self::Asc),
      "desc" | "descending" => Ok(Self::Desc),
      other => Err(format!("unknown sort order: {}", other)),
    }
  }
}

/// Optional narrowing for a search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
  pub min_price: Option<f64>,
  pub max_price: Option<f64>,
  pub location: Option<String>,
  pub amenities: Vec<String>,
  pub sort_by: Option<SortField>,
  pub sort_order: Option<SortOrder>,
}

impl SearchFilters {
  /// Reject prices that are negative, not finite, or inverted.
  pub fn validate(&self) -> DataResult<()> {
    for (label, price) in [("minPrice", self.min_price), ("maxPrice", self.max_price)] {
      if let Some(p) = price {
        if !p.is_finite() || p < 0.0 {
          return Err(DataError::validation(format!(
            "{} must be a non-negative number",
            label
          )));
        }
      }
    }
    if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
      if min > max {
        return Err(DataError::validation("minPrice cannot exceed maxPrice"));
      }
    }
    Ok(())
  }

  /// Query parameters in wire order; absent filters are omitted.
  pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(min) = self.min_price {
      pairs.push(("minPrice", min.to_string()));
    }
    if let Some(max) = self.max_price {
      pairs.push(("maxPrice", max.to_string()));
    }
    if let Some(location) = self.location.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
      pairs.push(("location", location.to_string()));
    }
    let amenities = self.normalized_amenities();
    if !amenities.is_empty() {
      pairs.push(("amenities", amenities.join(",")));
    }
    if let Some(sort_by) = self.sort_by {
      pairs.push(("sortBy", sort_by.as_str().to_string()));
    }
    if let Some(order) = self.sort_order {
      pairs.push(("sortOrder", order.as_str().to_string()));
    }
    pairs
  }

  /// Encoding used for cache keys: exactly the parameters sent on the wire.
  pub fn canonical_string(&self) -> String {
    self
      .query_pairs()
      .into_iter()
      .map(|(k, v)| format!("{}={}", k, v))
      .collect::<Vec<_>>()
      .join("&")
  }

  fn normalized_amenities(&self) -> Vec<String> {
    let mut amenities: Vec<String> = self
      .amenities
      .iter()
      .map(|a| a.trim().to_string())
      .filter(|a| !a.is_empty())
      .collect();
    amenities.sort_by_key(|a| a.to_lowercase());
    amenities.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
    amenities
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_filters_query_pairs() {
    let filters = SearchFilters {
      min_price: Some(100.0),
      max_price: Some(450.5),
      location: Some("  Legon ".into()),
      amenities: vec!["WiFi".into(), " AC ".into(), "".into()],
      sort_by: Some(SortField::Price),
      sort_order: Some(SortOrder::Desc),
    };
    assert_eq!(
      filters.query_pairs(),
      vec![
        ("minPrice", "100".to_string()),
        ("maxPrice", "450.5".to_string()),
        ("location", "Legon".to_string()),
        ("amenities", "AC,WiFi".to_string()),
        ("sortBy", "price".to_string()),
        ("sortOrder", "desc".to_string()),
      ]
    );
  }

  #[test]
  fn test_canonical_string_ignores_amenity_order() {
    let a = SearchFilters {
      amenities: vec!["WiFi".into(), "Parking".into()],
      ..Default::default()
    };
    let b = SearchFilters {
      amenities: vec!["Parking".into(), " WiFi".into()],
      ..Default::default()
    };
    assert_eq!(a.canonical_string(), b.canonical_string());
  }

  #[test]
  fn test_canonical_string_keeps_case_sent_to_backend() {
    let mixed = SearchFilters {
      location: Some("Legon".into()),
      ..Default::default()
    };
    let upper = SearchFilters {
      location: Some("LEGON".into()),
      ..Default::default()
    };
    assert_ne!(mixed.canonical_string(), upper.canonical_string());

    let wifi = SearchFilters {
      amenities: vec!["WiFi".into()],
      ..Default::default()
    };
    let lower = SearchFilters {
      amenities: vec!["wifi".into()],
      ..Default::default()
    };
    assert_ne!(wifi.canonical_string(), lower.canonical_string());
    assert_eq!(wifi.canonical_string(), "amenities=WiFi");
  }

  #[test]
  fn test_filter_validation() {
    assert!(SearchFilters::default().validate().is_ok());
    let negative = SearchFilters {
      min_price: Some(-1.0),
      ..Default::default()
    };
    assert!(matches!(negative.validate(), Err(DataError::Validation(_))));
    let inverted = SearchFilters {
      min_price: Some(500.0),
      max_price: Some(100.0),
      ..Default::default()
    };
    assert!(matches!(inverted.validate(), Err(DataError::Validation(_))));
  }

  #[test]
  fn test_sort_parsing() {
    assert_eq!("Price".parse::<SortField>(), Ok(SortField::Price));
    assert_eq!("newest".parse::<SortField>(), Ok(SortField::CreatedAt));
    assert_eq!("DESC".parse::<SortOrder>(), Ok(SortOrder::Desc));
    assert!("sideways".parse::<SortOrder>().is_err());
  }
}
