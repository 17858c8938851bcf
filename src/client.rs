//! Listings client: cache-first reads over a failover pool of providers.
//!
//! Every query follows the same path:
//! 1. Serve a fresh cache entry if one exists
//! 2. Otherwise fetch through the retry engine against the best eligible provider
//! 3. Store the normalized result and return it
//! 4. If the fetch ultimately fails with a transient/exhausted error, fall back
//!    to a stale copy of the same key before surfacing the error

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{BlobStore, CacheResult, CacheStats, CacheStore, ListingQueryKey};
use crate::config::Config;
use crate::error::{DataError, DataResult};
use crate::listing::{
  envelope, normalize, normalize_detail, normalize_search_hit, ListingDetail, ListingRecord, Page,
  SearchFilters, SearchHit,
};
use crate::provider::{Endpoint, ProviderDescriptor, ProviderRegistry, ProviderStatus};
use crate::retry::{RetryEngine, RetryPolicy};
use crate::transport::{Transport, TransportError, TransportRequest, DEFAULT_TIMEOUT};

/// Durable slot holding the serialized cache map.
pub const CACHE_NAMESPACE: &str = "listing_cache";

/// Per-operation cache lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
  pub list: Duration,
  pub detail: Duration,
  pub search: Duration,
}

impl Default for CacheTtls {
  fn default() -> Self {
    Self {
      list: Duration::from_secs(5 * 60),
      detail: Duration::from_secs(10 * 60),
      search: Duration::from_secs(2 * 60),
    }
  }
}

/// Everything the client caches, under one namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CachedPayload {
  Page(Page<ListingRecord>),
  Detail(ListingDetail),
  Search(Page<SearchHit>),
}

/// Types that can be stored as a [`CachedPayload`].
trait Cacheable: Sized + Clone {
  fn into_payload(self) -> CachedPayload;
  fn from_payload(payload: CachedPayload) -> Option<Self>;
}

impl Cacheable for Page<ListingRecord> {
  fn into_payload(self) -> CachedPayload {
    CachedPayload::Page(self)
  }

  fn from_payload(payload: CachedPayload) -> Option<Self> {
    match payload {
      CachedPayload::Page(page) => Some(page),
      _ => None,
    }
  }
}

impl Cacheable for ListingDetail {
  fn into_payload(self) -> CachedPayload {
    CachedPayload::Detail(self)
  }

  fn from_payload(payload: CachedPayload) -> Option<Self> {
    match payload {
      CachedPayload::Detail(detail) => Some(detail),
      _ => None,
    }
  }
}

impl Cacheable for Page<SearchHit> {
  fn into_payload(self) -> CachedPayload {
    CachedPayload::Search(self)
  }

  fn from_payload(payload: CachedPayload) -> Option<Self> {
    match payload {
      CachedPayload::Search(page) => Some(page),
      _ => None,
    }
  }
}

/// Data access facade owned by the host application.
pub struct ListingsClient {
  transport: Arc<dyn Transport>,
  registry: Arc<ProviderRegistry>,
  retry: RetryEngine,
  cache: CacheStore<CachedPayload>,
  ttls: CacheTtls,
  timeout: Duration,
}

impl ListingsClient {
  /// Create a client with default retry policy, TTLs and timeout.
  ///
  /// Any snapshot already persisted in `backing` is loaded here.
  pub fn new(
    transport: Arc<dyn Transport>,
    registry: ProviderRegistry,
    backing: Arc<dyn BlobStore>,
  ) -> Self {
    let ttls = CacheTtls::default();
    Self {
      transport,
      registry: Arc::new(registry),
      retry: RetryEngine::default(),
      cache: CacheStore::open(backing, CACHE_NAMESPACE, ttls.list),
      ttls,
      timeout: DEFAULT_TIMEOUT,
    }
  }

  /// Build a client from validated configuration.
  pub fn from_config(
    config: &Config,
    transport: Arc<dyn Transport>,
    backing: Arc<dyn BlobStore>,
  ) -> color_eyre::Result<Self> {
    let client = Self::new(transport, config.build_registry()?, backing)
      .with_retry_policy(config.retry_policy())
      .with_ttls(CacheTtls {
        list: Duration::from_secs(config.cache.list_ttl_secs),
        detail: Duration::from_secs(config.cache.detail_ttl_secs),
        search: Duration::from_secs(config.cache.search_ttl_secs),
      })
      .with_timeout(config.request_timeout())
      .with_max_entries(config.cache.max_entries);

    Ok(client)
  }

  pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
    self.retry = RetryEngine::new(policy);
    self
  }

  pub fn with_ttls(mut self, ttls: CacheTtls) -> Self {
    self.ttls = ttls;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
    self.cache = self.cache.with_max_entries(max_entries);
    self
  }

  /// Fetch one page of the listing feed. `page` is 1-based.
  pub async fn list_page(
    &self,
    page: u32,
    limit: u32,
  ) -> DataResult<CacheResult<Page<ListingRecord>>> {
    check_paging(page, limit)?;

    let key = ListingQueryKey::Page { page, limit };
    self
      .cached(&key, self.ttls.list, |provider| {
        self.fetch_page(provider, page, limit)
      })
      .await
  }

  /// Fetch one listing with its detail-page extras.
  ///
  /// Blank or absent ids are rejected before any request is made.
  pub async fn get_by_id<'a>(
    &self,
    id: impl Into<Option<&'a str>>,
  ) -> DataResult<CacheResult<ListingDetail>> {
    let id = id
      .into()
      .map(str::trim)
      .filter(|id| !id.is_empty())
      .ok_or_else(|| DataError::validation("listing id is required"))?;

    let key = ListingQueryKey::Detail { id };
    self
      .cached(&key, self.ttls.detail, |provider| {
        self.fetch_detail(provider, id)
      })
      .await
  }

  /// Search listings. Blank queries are rejected before any request is made.
  pub async fn search(
    &self,
    query: &str,
    filters: &SearchFilters,
    page: u32,
    limit: u32,
  ) -> DataResult<CacheResult<Page<SearchHit>>> {
    let query = query.trim();
    if query.is_empty() {
      return Err(DataError::validation("search query is required"));
    }
    filters.validate()?;
    check_paging(page, limit)?;

    let key = ListingQueryKey::Search {
      query,
      filters,
      page,
      limit,
    };
    self
      .cached(&key, self.ttls.search, |provider| {
        self.fetch_search(provider, query, filters, page, limit)
      })
      .await
  }

  /// Drop every cached entry, including the persisted snapshot.
  pub fn clear_cache(&self) {
    self.cache.clear();
    info!("Listing cache cleared");
  }

  /// Wait for queued cache snapshots to reach durable storage.
  pub async fn flush(&self) {
    self.cache.flush().await;
  }

  pub fn cache_stats(&self) -> CacheStats {
    self.cache.stats()
  }

  pub fn provider_status(&self) -> Vec<ProviderStatus> {
    self.registry.statuses()
  }

  async fn cached<T, F, Fut>(
    &self,
    key: &ListingQueryKey<'_>,
    ttl: Duration,
    fetch: F,
  ) -> DataResult<CacheResult<T>>
  where
    T: Cacheable,
    F: FnMut(Arc<ProviderDescriptor>) -> Fut,
    Fut: Future<Output = DataResult<T>>,
  {
    let cache_key = key.cache_key();

    if let Some(data) = self.cache.get(&cache_key).and_then(T::from_payload) {
      debug!(key = %cache_key, "Cache hit");
      return Ok(CacheResult::from_cache(data));
    }
    debug!(key = %cache_key, "Cache miss");

    match self.retry.run(&self.registry, fetch).await {
      Ok(outcome) => {
        debug!(
          key = %cache_key,
          provider = %outcome.provider,
          retries = outcome.retries.len(),
          "Fetched {}",
          key
        );
        self
          .cache
          .set(&cache_key, outcome.value.clone().into_payload(), Some(ttl));
        Ok(CacheResult::from_network(outcome.value))
      }
      Err(err) if err.allows_stale_fallback() => {
        match self.cache.get_stale(&cache_key).and_then(T::from_payload) {
          Some(data) => {
            warn!(key = %cache_key, error = %err, "All providers failed; serving stale cache entry");
            Ok(CacheResult::offline(data))
          }
          None => Err(err),
        }
      }
      Err(err) => Err(err),
    }
  }

  async fn fetch_page(
    &self,
    provider: Arc<ProviderDescriptor>,
    page: u32,
    limit: u32,
  ) -> DataResult<Page<ListingRecord>> {
    let mut url = provider.endpoint_url(Endpoint::List, None)?;
    url
      .query_pairs_mut()
      .append_pair("page", &page.to_string())
      .append_pair("limit", &limit.to_string());

    let body = self.send(&provider, url, "list listings").await?;
    let envelope = envelope::collection(&body)?;
    Ok(envelope::into_page(envelope, limit, normalize))
  }

  async fn fetch_detail(
    &self,
    provider: Arc<ProviderDescriptor>,
    id: &str,
  ) -> DataResult<ListingDetail> {
    let url = provider.endpoint_url(Endpoint::Detail, Some(id))?;
    let body = self.send(&provider, url, &format!("listing {}", id)).await?;
    normalize_detail(envelope::single(&body, id)?)
  }

  async fn fetch_search(
    &self,
    provider: Arc<ProviderDescriptor>,
    query: &str,
    filters: &SearchFilters,
    page: u32,
    limit: u32,
  ) -> DataResult<Page<SearchHit>> {
    let mut url = provider.endpoint_url(Endpoint::Search, None)?;
    {
      let mut pairs = url.query_pairs_mut();
      pairs
        .append_pair("q", query)
        .append_pair("page", &page.to_string())
        .append_pair("limit", &limit.to_string());
      for (name, value) in filters.query_pairs() {
        pairs.append_pair(name, &value);
      }
    }

    let body = self.send(&provider, url, "search listings").await?;
    let envelope = envelope::collection(&body)?;
    Ok(envelope::into_page(envelope, limit, normalize_search_hit))
  }

  /// One request against one provider. Non-2xx statuses are classified here.
  async fn send(&self, provider: &ProviderDescriptor, url: Url, context: &str) -> DataResult<Value> {
    debug!(provider = %provider.name, url = %url, "Sending request");
    let request = TransportRequest::get(url)
      .with_headers(&provider.default_headers)
      .with_timeout(self.timeout);

    let response = tokio::time::timeout(self.timeout, self.transport.request(request))
      .await
      .map_err(|_| TransportError::Timeout(self.timeout))??;

    if !response.is_success() {
      debug!(provider = %provider.name, status = response.status, "Request failed");
      return Err(DataError::from_status(response.status, context));
    }
    Ok(response.body)
  }
}

fn check_paging(page: u32, limit: u32) -> DataResult<()> {
  if page == 0 {
    return Err(DataError::validation("page must be at least 1"));
  }
  if limit == 0 {
    return Err(DataError::validation("limit must be greater than zero"));
  }
  Ok(())
}
