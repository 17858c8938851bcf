//! Ordered-key lookup over untyped payload objects.
//!
//! Backends have used several names for the same field over time. Each
//! canonical field declares its accepted source keys in priority order and
//! the first present, non-null value that converts to the target type wins.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

pub type Object = Map<String, Value>;

/// Accepted source keys for each canonical field, highest priority first.
pub mod keys {
  pub const ID: &[&str] = &["id", "_id", "accommodation_id"];
  pub const NAME: &[&str] = &["name", "title", "hostel_name", "accommodation_name"];
  pub const DESCRIPTION: &[&str] = &["description", "desc", "summary"];
  pub const ADDRESS: &[&str] = &["address", "location", "street_address", "full_address"];
  pub const PRICE: &[&str] = &["price", "rent", "monthly_rent", "price_per_month", "pricePerMonth"];
  pub const AMENITIES: &[&str] = &["amenities", "facilities"];
  pub const IMAGES: &[&str] = &["images", "image_urls", "imageUrls", "photos", "image", "image_url"];
  pub const PHONE: &[&str] = &["contactPhone", "phone", "contact_phone"];
  pub const EMAIL: &[&str] = &["contactEmail", "email", "contact_email"];
  pub const ACTIVE: &[&str] = &["isActive", "is_active", "active"];
  pub const STATUS: &[&str] = &["status"];
  pub const GEO: &[&str] = &["coordinates", "location", "geolocation", "geo"];
  pub const LATITUDE: &[&str] = &["lat", "latitude"];
  pub const LONGITUDE: &[&str] = &["lng", "lon", "longitude"];
  pub const CREATED_AT: &[&str] = &["createdAt", "created_at"];
  pub const UPDATED_AT: &[&str] = &["updatedAt", "updated_at"];
  pub const IMAGE_URL: &[&str] = &["url", "uri", "src"];
  pub const AMENITY_NAME: &[&str] = &["name", "label"];

  pub const LANDLORD: &[&str] = &["landlord", "owner", "host"];
  pub const LANDLORD_ID: &[&str] = &["id", "_id", "user_id", "userId"];
  pub const LANDLORD_NAME: &[&str] = &["name", "full_name", "fullName", "displayName"];
  pub const LANDLORD_PHONE: &[&str] = &["phone", "contactPhone", "phone_number"];
  pub const LANDLORD_EMAIL: &[&str] = &["email", "contactEmail"];
  pub const VIEW_COUNT: &[&str] = &["viewCount", "view_count", "views"];
  pub const CONTACT_COUNT: &[&str] = &["contactCount", "contact_count", "inquiries"];

  pub const RELEVANCE: &[&str] = &["relevanceScore", "relevance_score", "score"];
  pub const DISTANCE: &[&str] = &["distance", "distance_km", "distanceKm"];
}

/// First present, non-null value among `keys` for which `convert` succeeds.
pub fn probe<'a, T>(
  obj: &'a Object,
  keys: &[&str],
  convert: impl Fn(&'a Value) -> Option<T>,
) -> Option<T> {
  keys
    .iter()
    .filter_map(|key| obj.get(*key))
    .filter(|value| !value.is_null())
    .find_map(convert)
}

pub fn probe_string(obj: &Object, keys: &[&str]) -> Option<String> {
  probe(obj, keys, as_string)
}

pub fn probe_f64(obj: &Object, keys: &[&str]) -> Option<f64> {
  probe(obj, keys, as_f64)
}

pub fn probe_u64(obj: &Object, keys: &[&str]) -> Option<u64> {
  probe(obj, keys, |v| as_f64(v).filter(|n| *n >= 0.0).map(|n| n as u64))
}

pub fn probe_bool(obj: &Object, keys: &[&str]) -> Option<bool> {
  probe(obj, keys, as_bool)
}

pub fn probe_object<'a>(obj: &'a Object, keys: &[&str]) -> Option<&'a Object> {
  keys
    .iter()
    .filter_map(|key| obj.get(*key))
    .find_map(Value::as_object)
}

pub fn probe_datetime(obj: &Object, keys: &[&str]) -> Option<DateTime<Utc>> {
  probe(obj, keys, as_datetime)
}

/// Non-blank strings (trimmed) and numbers, rendered as text.
pub fn as_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => {
      let trimmed = s.trim();
      (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// Finite numbers, from JSON numbers or numeric strings.
pub fn as_f64(value: &Value) -> Option<f64> {
  let n = match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  }?;
  n.is_finite().then_some(n)
}

pub fn as_bool(value: &Value) -> Option<bool> {
  match value {
    Value::Bool(b) => Some(*b),
    Value::Number(n) => n.as_i64().map(|n| n != 0),
    Value::String(s) => match s.trim().to_lowercase().as_str() {
      "true" | "yes" | "1" => Some(true),
      "false" | "no" | "0" => Some(false),
      _ => None,
    },
    _ => None,
  }
}

/// RFC 3339 / Postgres-style timestamps, or epoch milliseconds.
pub fn as_datetime(value: &Value) -> Option<DateTime<Utc>> {
  match value {
    Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
    Value::String(s) => parse_timestamp(s.trim()),
    _ => None,
  }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
    return Some(dt.with_timezone(&Utc));
  }
  ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn obj(value: Value) -> Object {
    value.as_object().cloned().unwrap()
  }

  #[test]
  fn test_probe_respects_priority_and_skips_null() {
    let o = obj(json!({"_id": "b", "id": null, "accommodation_id": "c"}));
    assert_eq!(probe_string(&o, keys::ID), Some("b".to_string()));
  }

  #[test]
  fn test_probe_skips_unconvertible_values() {
    let o = obj(json!({"location": {"lat": 1.0, "lng": 2.0}, "street_address": "12 High St"}));
    assert_eq!(probe_string(&o, keys::ADDRESS), Some("12 High St".to_string()));
  }

  #[test]
  fn test_blank_strings_are_absent() {
    let o = obj(json!({"id": "  ", "_id": 42}));
    assert_eq!(probe_string(&o, keys::ID), Some("42".to_string()));
  }

  #[test]
  fn test_numeric_coercion() {
    assert_eq!(as_f64(&json!("450.50")), Some(450.5));
    assert_eq!(as_f64(&json!(300)), Some(300.0));
    assert_eq!(as_f64(&json!("cheap")), None);
    assert_eq!(as_bool(&json!("false")), Some(false));
    assert_eq!(as_bool(&json!(1)), Some(true));
  }

  #[test]
  fn test_datetime_formats() {
    let expected = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
      .unwrap()
      .with_timezone(&Utc);
    assert_eq!(as_datetime(&json!("2024-03-01T10:00:00Z")), Some(expected));
    assert_eq!(as_datetime(&json!("2024-03-01 10:00:00+00")), Some(expected));
    assert_eq!(as_datetime(&json!("2024-03-01 10:00:00")), Some(expected));
    assert_eq!(as_datetime(&json!(1709287200000i64)), Some(expected));
    assert_eq!(as_datetime(&json!("last tuesday")), None);
  }
}
