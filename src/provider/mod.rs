//! Listing providers: one primary backend plus ordered fallbacks.
//!
//! # Data Flow
//! ```text
//! Facade needs data
//!     → registry.rs (best eligible provider: primary, else first eligible fallback)
//!     → ProviderDescriptor::endpoint_url (resolve endpoint template)
//!     → Transport request
//!     → registry.rs (mark success / failure, start cooldown)
//! ```

mod registry;

pub use registry::{Health, ProviderRegistry, ProviderRole, ProviderStatus};

use std::collections::BTreeMap;
use url::Url;

use crate::error::{DataError, DataResult};

/// Placeholder replaced by the listing id in detail endpoint templates.
pub const ID_PLACEHOLDER: &str = "{id}";

/// The operations a provider must expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
  List,
  Detail,
  Search,
}

/// Path templates relative to a provider's base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointMap {
  pub list: String,
  pub detail: String,
  pub search: String,
}

impl Default for EndpointMap {
  fn default() -> Self {
    Self {
      list: "/listings".to_string(),
      detail: "/listings/{id}".to_string(),
      search: "/listings/search".to_string(),
    }
  }
}

impl EndpointMap {
  fn template(&self, endpoint: Endpoint) -> &str {
    match endpoint {
      Endpoint::List => &self.list,
      Endpoint::Detail => &self.detail,
      Endpoint::Search => &self.search,
    }
  }
}

/// Static description of one backend.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
  pub name: String,
  pub base_url: Url,
  pub endpoints: EndpointMap,
  pub default_headers: BTreeMap<String, String>,
}

impl ProviderDescriptor {
  pub fn new(name: impl Into<String>, base_url: Url) -> Self {
    Self {
      name: name.into(),
      base_url,
      endpoints: EndpointMap::default(),
      default_headers: BTreeMap::new(),
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.default_headers.insert(name.into(), value.into());
    self
  }

  /// Resolve `endpoint` against the base URL, substituting `id` into `{id}` segments.
  ///
  /// Segments are percent-encoded, so ids cannot escape their path segment.
  pub fn endpoint_url(&self, endpoint: Endpoint, id: Option<&str>) -> DataResult<Url> {
    let template = self.endpoints.template(endpoint);
    let mut url = self.base_url.clone();
    {
      let mut segments = url.path_segments_mut().map_err(|_| {
        DataError::validation(format!(
          "provider {} has a base URL that cannot carry paths",
          self.name
        ))
      })?;
      segments.pop_if_empty();
      for segment in template.split('/').filter(|s| !s.is_empty()) {
        if segment == ID_PLACEHOLDER {
          let id = id.ok_or_else(|| DataError::validation("endpoint requires a listing id"))?;
          segments.push(id);
        } else {
          segments.push(segment);
        }
      }
    }
    Ok(url)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn provider(base: &str) -> ProviderDescriptor {
    ProviderDescriptor::new("primary", Url::parse(base).unwrap())
  }

  #[test]
  fn test_endpoint_joins_base_path() {
    let p = provider("https://api.example.com/v1/");
    let url = p.endpoint_url(Endpoint::List, None).unwrap();
    assert_eq!(url.as_str(), "https://api.example.com/v1/listings");
  }

  #[test]
  fn test_detail_substitutes_encoded_id() {
    let p = provider("https://api.example.com");
    let url = p.endpoint_url(Endpoint::Detail, Some("a b/c")).unwrap();
    assert_eq!(url.as_str(), "https://api.example.com/listings/a%20b%2Fc");
  }

  #[test]
  fn test_detail_without_id_is_rejected() {
    let p = provider("https://api.example.com");
    assert!(matches!(
      p.endpoint_url(Endpoint::Detail, None),
      Err(DataError::Validation(_))
    ));
  }
}
