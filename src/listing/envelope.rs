//! Top-level response shapes returned by listing backends.
//!
//! Collection responses arrive as one of:
//! - a wrapped array with metadata: `{"data": [...], "total": 40, "hasMore": true}`
//! - a bare array: `[...]`
//! - the legacy hostels object: `{"hostels": [...], "count": 40}`
//!
//! Single-record responses arrive bare, wrapped (`{"data": {...}}`), or as a
//! one-element array.

use serde_json::Value;
use tracing::warn;

use super::lookup::{self, keys, Object};
use super::types::Page;
use crate::error::{DataError, DataResult};

const WRAPPED_ITEM_KEYS: &[&str] = &["data", "items", "listings", "results"];
const LEGACY_ITEM_KEYS: &[&str] = &["hostels"];
const META_KEYS: &[&str] = &["meta", "pagination"];
const TOTAL_KEYS: &[&str] = &["total", "count", "totalCount", "total_count"];
const HAS_MORE_KEYS: &[&str] = &["hasMore", "has_more", "hasNextPage"];
const SINGLE_WRAPPER_KEYS: &[&str] = &["data", "listing", "hostel", "accommodation"];

/// A recognized collection response.
#[derive(Debug)]
pub struct Envelope<'a> {
  pub items: &'a [Value],
  pub total: Option<u64>,
  pub has_more: Option<bool>,
}

/// Recognize a collection response shape.
pub fn collection(body: &Value) -> DataResult<Envelope<'_>> {
  match body {
    Value::Array(items) => Ok(Envelope {
      items,
      total: None,
      has_more: None,
    }),
    Value::Object(obj) => {
      let items = lookup::probe(obj, WRAPPED_ITEM_KEYS, as_array)
        .or_else(|| lookup::probe(obj, LEGACY_ITEM_KEYS, as_array))
        .ok_or_else(|| DataError::transient("unrecognized collection response shape"))?;

      Ok(Envelope {
        items,
        total: lookup::probe_u64(obj, TOTAL_KEYS).or_else(|| meta(obj, |m| lookup::probe_u64(m, TOTAL_KEYS))),
        has_more: lookup::probe_bool(obj, HAS_MORE_KEYS)
          .or_else(|| meta(obj, |m| lookup::probe_bool(m, HAS_MORE_KEYS))),
      })
    }
    _ => Err(DataError::transient("unrecognized collection response shape")),
  }
}

/// Recognize a single-record response shape. An empty array means not found.
pub fn single<'a>(body: &'a Value, id: &str) -> DataResult<&'a Value> {
  match body {
    Value::Array(items) => items
      .first()
      .ok_or_else(|| DataError::NotFound(format!("listing {}", id))),
    Value::Object(obj) if lookup::probe_string(obj, keys::ID).is_some() => Ok(body),
    Value::Object(obj) => match SINGLE_WRAPPER_KEYS.iter().find_map(|key| obj.get(*key)) {
      Some(inner @ Value::Object(_)) => Ok(inner),
      Some(Value::Array(items)) => items
        .first()
        .ok_or_else(|| DataError::NotFound(format!("listing {}", id))),
      Some(Value::Null) => Err(DataError::NotFound(format!("listing {}", id))),
      // not a wrapper, let the normalizer judge the record itself
      _ => Ok(body),
    },
    Value::Null => Err(DataError::NotFound(format!("listing {}", id))),
    _ => Err(DataError::transient("unrecognized listing response shape")),
  }
}

/// Normalize every element, skipping those without identity.
///
/// `has_more` comes from the explicit flag when present, else from a full page.
pub fn into_page<T>(
  envelope: Envelope<'_>,
  limit: u32,
  normalize: impl Fn(&Value) -> DataResult<T>,
) -> Page<T> {
  let returned = envelope.items.len();
  let items: Vec<T> = envelope
    .items
    .iter()
    .filter_map(|raw| match normalize(raw) {
      Ok(item) => Some(item),
      Err(e) => {
        warn!(error = %e, "Skipping unusable listing in response");
        None
      }
    })
    .collect();

  Page {
    total: envelope.total.unwrap_or(items.len() as u64),
    has_more: envelope
      .has_more
      .unwrap_or(returned == limit as usize),
    items,
  }
}

fn as_array(value: &Value) -> Option<&[Value]> {
  value.as_array().map(Vec::as_slice)
}

fn meta<T>(obj: &Object, read: impl Fn(&Object) -> Option<T>) -> Option<T> {
  lookup::probe_object(obj, META_KEYS).and_then(read)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::listing::normalize;
  use serde_json::json;

  #[test]
  fn test_wrapped_array_with_metadata() {
    let body = json!({"data": [{"id": "a"}, {"id": "b"}], "total": 40, "hasMore": true});
    let page = into_page(collection(&body).unwrap(), 20, normalize::normalize);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total, 40);
    assert!(page.has_more);
  }

  #[test]
  fn test_nested_pagination_metadata() {
    let body = json!({"items": [{"id": "a"}], "pagination": {"total_count": 9, "has_more": false}});
    let page = into_page(collection(&body).unwrap(), 1, normalize::normalize);
    assert_eq!(page.total, 9);
    assert!(!page.has_more);
  }

  #[test]
  fn test_bare_array_infers_has_more_from_limit() {
    let body = json!([{"id": "a"}, {"id": "b"}]);
    let full = into_page(collection(&body).unwrap(), 2, normalize::normalize);
    assert!(full.has_more);
    assert_eq!(full.total, 2);

    let short = into_page(collection(&body).unwrap(), 5, normalize::normalize);
    assert!(!short.has_more);
  }

  #[test]
  fn test_legacy_hostels_object() {
    let body = json!({"hostels": [{"_id": "h1"}, {"name": "no id"}], "count": 12});
    let page = into_page(collection(&body).unwrap(), 2, normalize::normalize);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, "h1");
    assert_eq!(page.total, 12);
    // inferred from the returned count, not the usable count
    assert!(page.has_more);
  }

  #[test]
  fn test_unknown_shape_is_transient() {
    assert!(collection(&json!({"message": "ok"})).unwrap_err().is_retryable());
    assert!(collection(&json!("listings")).unwrap_err().is_retryable());
  }

  #[test]
  fn test_single_record_shapes() {
    let bare = json!({"id": "m1"});
    assert_eq!(single(&bare, "m1").unwrap(), &bare);

    let wrapped = json!({"data": {"_id": "m1"}});
    assert_eq!(single(&wrapped, "m1").unwrap(), &json!({"_id": "m1"}));

    let rows = json!([{"id": "m1"}]);
    assert_eq!(single(&rows, "m1").unwrap(), &json!({"id": "m1"}));

    assert!(matches!(single(&json!([]), "m1"), Err(DataError::NotFound(_))));
    assert!(matches!(single(&json!({"data": null}), "m1"), Err(DataError::NotFound(_))));
    let unnamed = json!({"name": "no id"});
    assert_eq!(single(&unnamed, "m1").unwrap(), &unnamed);
    assert!(matches!(single(&Value::Null, "m1"), Err(DataError::NotFound(_))));
  }
}
