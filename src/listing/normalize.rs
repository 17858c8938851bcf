//! Payload normalization into canonical listing records.
//!
//! Pure functions: no I/O. Only a missing identity is an error; every other
//! field falls back to a neutral default.

use serde_json::Value;

use super::lookup::{self, keys, Object};
use super::types::{GeoPoint, Landlord, ListingDetail, ListingRecord, SearchHit};
use crate::error::{DataError, DataResult};

/// Normalize one raw listing payload.
pub fn normalize(raw: &Value) -> DataResult<ListingRecord> {
  let obj = raw
    .as_object()
    .ok_or_else(|| DataError::validation("listing payload is not an object"))?;

  let id = lookup::probe_string(obj, keys::ID)
    .ok_or_else(|| DataError::validation("listing payload has no identity field"))?;

  Ok(ListingRecord {
    id,
    name: lookup::probe_string(obj, keys::NAME).unwrap_or_default(),
    description: lookup::probe_string(obj, keys::DESCRIPTION),
    address: lookup::probe_string(obj, keys::ADDRESS).unwrap_or_default(),
    price: lookup::probe_f64(obj, keys::PRICE)
      .filter(|p| *p >= 0.0)
      .unwrap_or(0.0),
    amenities: lookup::probe(obj, keys::AMENITIES, amenity_list).unwrap_or_default(),
    images: lookup::probe(obj, keys::IMAGES, image_list).unwrap_or_default(),
    contact_phone: lookup::probe_string(obj, keys::PHONE),
    contact_email: lookup::probe_string(obj, keys::EMAIL),
    is_active: is_active(obj),
    geolocation: geolocation(obj),
    created_at: lookup::probe_datetime(obj, keys::CREATED_AT),
    updated_at: lookup::probe_datetime(obj, keys::UPDATED_AT),
  })
}

/// Normalize a detail payload, keeping landlord and engagement counters.
pub fn normalize_detail(raw: &Value) -> DataResult<ListingDetail> {
  let record = normalize(raw)?;
  let obj = raw.as_object().ok_or_else(|| DataError::validation("listing payload is not an object"))?;

  Ok(ListingDetail {
    record,
    landlord: lookup::probe_object(obj, keys::LANDLORD).and_then(landlord),
    view_count: lookup::probe_u64(obj, keys::VIEW_COUNT),
    contact_count: lookup::probe_u64(obj, keys::CONTACT_COUNT),
  })
}

/// Normalize a search result, keeping ranking metadata.
pub fn normalize_search_hit(raw: &Value) -> DataResult<SearchHit> {
  let record = normalize(raw)?;
  let obj = raw.as_object().ok_or_else(|| DataError::validation("listing payload is not an object"))?;

  Ok(SearchHit {
    record,
    relevance_score: lookup::probe_f64(obj, keys::RELEVANCE),
    distance: lookup::probe_f64(obj, keys::DISTANCE).filter(|d| *d >= 0.0),
  })
}

/// Explicit `false` or an "inactive" status deactivates; anything else is active.
fn is_active(obj: &Object) -> bool {
  if lookup::probe_bool(obj, keys::ACTIVE) == Some(false) {
    return false;
  }
  !lookup::probe_string(obj, keys::STATUS).is_some_and(|s| s.eq_ignore_ascii_case("inactive"))
}

/// A list of names or `{name}` objects, or one comma-separated string.
fn amenity_list(value: &Value) -> Option<Vec<String>> {
  match value {
    Value::Array(items) => Some(
      items
        .iter()
        .filter_map(|item| match item {
          Value::Object(o) => lookup::probe_string(o, keys::AMENITY_NAME),
          other => lookup::as_string(other),
        })
        .collect(),
    ),
    Value::String(s) => Some(
      s.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect(),
    ),
    _ => None,
  }
}

/// A list of URIs or `{url}` objects, or a single URI.
fn image_list(value: &Value) -> Option<Vec<String>> {
  match value {
    Value::Array(items) => Some(
      items
        .iter()
        .filter_map(|item| match item {
          Value::Object(o) => lookup::probe_string(o, keys::IMAGE_URL),
          Value::String(_) => lookup::as_string(item),
          _ => None,
        })
        .collect(),
    ),
    Value::String(_) => lookup::as_string(value).map(|uri| vec![uri]),
    Value::Object(o) => lookup::probe_string(o, keys::IMAGE_URL).map(|uri| vec![uri]),
    _ => None,
  }
}

fn geolocation(obj: &Object) -> Option<GeoPoint> {
  lookup::probe(obj, keys::GEO, |value| value.as_object().and_then(geo_point))
    .or_else(|| geo_point(obj))
}

fn geo_point(obj: &Object) -> Option<GeoPoint> {
  let lat = lookup::probe_f64(obj, keys::LATITUDE)?;
  let lon = lookup::probe_f64(obj, keys::LONGITUDE)?;
  ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)).then_some(GeoPoint { lat, lon })
}

fn landlord(obj: &Object) -> Option<Landlord> {
  let landlord = Landlord {
    id: lookup::probe_string(obj, keys::LANDLORD_ID),
    name: lookup::probe_string(obj, keys::LANDLORD_NAME),
    phone: lookup::probe_string(obj, keys::LANDLORD_PHONE),
    email: lookup::probe_string(obj, keys::LANDLORD_EMAIL),
  };
  let empty = landlord.id.is_none()
    && landlord.name.is_none()
    && landlord.phone.is_none()
    && landlord.email.is_none();
  (!empty).then_some(landlord)
}
