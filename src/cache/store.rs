//! Time-bounded in-memory cache with durable snapshot persistence.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::clock;
use super::storage::BlobStore;
use super::traits::{CacheEntry, CacheStats};

const MIN_TTL: Duration = Duration::from_millis(1);
const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// How long an expired entry stays around for stale reads before `get` purges it.
pub const DEFAULT_STALE_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// TTL-keyed cache whose whole map is persisted under one namespace key.
///
/// Expiry is evaluated lazily on read. Expired entries remain available to
/// [`CacheStore::get_stale`] until they age past the stale retention window.
///
/// Snapshots are written off the caller's task: inside a tokio runtime each
/// write runs on the blocking pool, and [`CacheStore::flush`] waits for them.
pub struct CacheStore<T> {
  entries: RwLock<HashMap<String, CacheEntry<T>>>,
  persister: Arc<Persister>,
  default_ttl: Duration,
  max_entries: Option<usize>,
  stale_retention: Duration,
}

/// Durable side of the cache.
///
/// Every snapshot gets a generation number; a write older than the last one
/// that reached storage is dropped, so the newest map always wins.
struct Persister {
  backing: Arc<dyn BlobStore>,
  namespace: String,
  issued: AtomicU64,
  written: Mutex<u64>,
  completed: watch::Sender<u64>,
}

impl Persister {
  fn new(backing: Arc<dyn BlobStore>, namespace: String) -> Self {
    let (completed, _) = watch::channel(0);
    Self {
      backing,
      namespace,
      issued: AtomicU64::new(0),
      written: Mutex::new(0),
      completed,
    }
  }

  fn next_generation(&self) -> u64 {
    self.issued.fetch_add(1, Ordering::SeqCst) + 1
  }

  /// Queue a snapshot (`None` deletes the slot). Runs inline outside a runtime.
  fn submit(self: &Arc<Self>, generation: u64, snapshot: Option<Vec<u8>>) {
    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        let persister = Arc::clone(self);
        handle.spawn_blocking(move || persister.write(generation, snapshot));
      }
      Err(_) => self.write(generation, snapshot),
    }
  }

  fn write(&self, generation: u64, snapshot: Option<Vec<u8>>) {
    let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
    if *written >= generation {
      debug!(namespace = %self.namespace, generation, "Skipping superseded cache snapshot");
      return;
    }

    let result = match &snapshot {
      Some(bytes) => self.backing.write_blob(&self.namespace, bytes),
      None => self.backing.delete_blob(&self.namespace),
    };
    if let Err(e) = result {
      warn!(namespace = %self.namespace, error = %e, "Failed to persist cache snapshot");
    }

    *written = generation;
    self.completed.send_replace(generation);
  }

  /// Settle `generation` without touching storage.
  fn abandon(&self, generation: u64) {
    let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
    if *written < generation {
      *written = generation;
      self.completed.send_replace(generation);
    }
  }
}

impl<T> CacheStore<T>
where
  T: Clone + Serialize + DeserializeOwned,
{
  /// Create a cache and load any non-expired entries persisted under `namespace`.
  ///
  /// Unreadable or corrupt snapshots are treated as an empty cache.
  pub fn open(backing: Arc<dyn BlobStore>, namespace: impl Into<String>, default_ttl: Duration) -> Self {
    let namespace = namespace.into();
    let entries = load_snapshot::<T>(backing.as_ref(), &namespace);

    Self {
      entries: RwLock::new(entries),
      persister: Arc::new(Persister::new(backing, namespace)),
      default_ttl,
      max_entries: None,
      stale_retention: DEFAULT_STALE_RETENTION,
    }
  }

  /// Bound the number of entries. Expired entries are evicted first, then the oldest.
  pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
    self.max_entries = max_entries.filter(|n| *n > 0);
    self
  }

  pub fn with_stale_retention(mut self, stale_retention: Duration) -> Self {
    self.stale_retention = stale_retention;
    self
  }

  /// Return the value for `key` only while it is fresh.
  pub fn get(&self, key: &str) -> Option<T> {
    let now = clock::now();
    let (value, purge) = {
      let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
      let value = entries
        .get(key)
        .filter(|entry| entry.is_fresh_at(now))
        .map(|entry| entry.data.clone());
      let purge = entries
        .values()
        .any(|entry| self.is_past_retention(entry, now));
      (value, purge)
    };

    if purge {
      self.purge_retired(now);
    }

    value
  }

  /// Return the last written value for `key`, fresh or expired.
  pub fn get_stale(&self, key: &str) -> Option<T> {
    let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
    entries.get(key).map(|entry| entry.data.clone())
  }

  /// Store `value` with the default TTL or `ttl` when given.
  ///
  /// The in-memory write is done when this returns. Persistence follows in
  /// the background and its failure is only logged.
  pub fn set(&self, key: &str, value: T, ttl: Option<Duration>) {
    let ttl = ttl.unwrap_or(self.default_ttl).clamp(MIN_TTL, MAX_TTL);
    let created_at = clock::now();
    let expires_at = created_at
      + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::milliseconds(1));

    {
      let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
      if !entries.contains_key(key) {
        if let Some(max) = self.max_entries {
          while entries.len() >= max {
            match eviction_candidate(&entries, created_at) {
              Some(victim) => {
                debug!(key = %victim, "Evicting cache entry");
                entries.remove(&victim);
              }
              None => break,
            }
          }
        }
      }
      entries.insert(
        key.to_string(),
        CacheEntry {
          data: value,
          created_at,
          expires_at,
        },
      );
    }

    self.persist();
  }

  /// Remove every entry, in memory and in durable storage.
  pub fn clear(&self) {
    let generation = {
      let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
      entries.clear();
      self.persister.next_generation()
    };
    self.persister.submit(generation, None);
  }

  /// Wait until every snapshot queued so far has reached durable storage.
  pub async fn flush(&self) {
    let target = self.persister.issued.load(Ordering::SeqCst);
    let mut completed = self.persister.completed.subscribe();
    // the sender lives in `self.persister`, so the channel stays open
    let _ = completed.wait_for(|written| *written >= target).await;
  }

  pub fn stats(&self) -> CacheStats {
    let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
    let mut keys: Vec<String> = entries.keys().cloned().collect();
    keys.sort();
    CacheStats {
      size: keys.len(),
      keys,
    }
  }

  fn is_past_retention(&self, entry: &CacheEntry<T>, now: DateTime<Utc>) -> bool {
    chrono::Duration::from_std(self.stale_retention)
      .map(|retention| now >= entry.expires_at + retention)
      .unwrap_or(false)
  }

  fn purge_retired(&self, now: DateTime<Utc>) {
    let removed = {
      let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
      let before = entries.len();
      entries.retain(|_, entry| !self.is_past_retention(entry, now));
      before - entries.len()
    };

    if removed > 0 {
      debug!(removed, "Purged retired cache entries");
      self.persist();
    }
  }

  fn persist(&self) {
    // generations are taken under the lock so their order matches the maps they encode
    let (generation, snapshot) = {
      let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
      (self.persister.next_generation(), serde_json::to_vec(&*entries))
    };

    match snapshot {
      Ok(bytes) => self.persister.submit(generation, Some(bytes)),
      Err(e) => {
        warn!(namespace = %self.persister.namespace, error = %e, "Failed to serialize cache snapshot");
        self.persister.abandon(generation);
      }
    }
  }
}

fn load_snapshot<T: DeserializeOwned>(
  backing: &dyn BlobStore,
  namespace: &str,
) -> HashMap<String, CacheEntry<T>> {
  let bytes = match backing.read_blob(namespace) {
    Ok(Some(bytes)) => bytes,
    Ok(None) => return HashMap::new(),
    Err(e) => {
      warn!(namespace, error = %e, "Could not read persisted cache, starting empty");
      return HashMap::new();
    }
  };

  let mut entries: HashMap<String, CacheEntry<T>> = match serde_json::from_slice(&bytes) {
    Ok(entries) => entries,
    Err(e) => {
      warn!(namespace, error = %e, "Persisted cache is corrupt, starting empty");
      return HashMap::new();
    }
  };

  let now = clock::now();
  entries.retain(|_, entry| entry.is_fresh_at(now));
  debug!(namespace, loaded = entries.len(), "Loaded persisted cache");
  entries
}

/// Pick an expired entry if there is one, otherwise the oldest.
fn eviction_candidate<T>(
  entries: &HashMap<String, CacheEntry<T>>,
  now: DateTime<Utc>,
) -> Option<String> {
  entries
    .iter()
    .find(|(_, entry)| !entry.is_fresh_at(now))
    .or_else(|| entries.iter().min_by_key(|(_, entry)| entry.created_at))
    .map(|(key, _)| key.clone())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::testing::GatedBlobStore;
  use crate::cache::storage::MemoryBlobStore;

  const NS: &str = "test_cache";

  fn store_with(backing: Arc<dyn BlobStore>) -> CacheStore<String> {
    CacheStore::open(backing, NS, Duration::from_secs(300))
  }

  struct FailingBlobStore;

  impl BlobStore for FailingBlobStore {
    fn read_blob(&self, _key: &str) -> color_eyre::Result<Option<Vec<u8>>> {
      Err(color_eyre::eyre::eyre!("disk unavailable"))
    }

    fn write_blob(&self, _key: &str, _bytes: &[u8]) -> color_eyre::Result<()> {
      Err(color_eyre::eyre::eyre!("disk full"))
    }

    fn delete_blob(&self, _key: &str) -> color_eyre::Result<()> {
      Err(color_eyre::eyre::eyre!("disk unavailable"))
    }
  }

  #[test]
  fn test_set_then_get_round_trip() {
    let cache = store_with(Arc::new(MemoryBlobStore::new()));
    cache.set("listings_1_20", "page".to_string(), None);
    assert_eq!(cache.get("listings_1_20"), Some("page".to_string()));
    assert_eq!(cache.get("listings_2_20"), None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_expired_entry_is_absent_but_stale_readable() {
    let cache = store_with(Arc::new(MemoryBlobStore::new()));
    cache.set("detail_m1", "v1".to_string(), Some(Duration::from_secs(600)));

    tokio::time::advance(Duration::from_secs(599)).await;
    assert_eq!(cache.get("detail_m1"), Some("v1".to_string()));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.get("detail_m1"), None);
    assert_eq!(cache.get_stale("detail_m1"), Some("v1".to_string()));
    assert_eq!(cache.stats().size, 1);
  }

  #[test]
  fn test_overwrite_replaces_value() {
    let cache = store_with(Arc::new(MemoryBlobStore::new()));
    cache.set("k", "old".to_string(), None);
    cache.set("k", "new".to_string(), None);
    assert_eq!(cache.get("k"), Some("new".to_string()));
    assert_eq!(cache.stats().size, 1);
  }

  #[tokio::test]
  async fn test_clear_empties_memory_and_backing() {
    let backing = Arc::new(MemoryBlobStore::new());
    let cache = store_with(backing.clone());
    cache.set("a", "1".to_string(), None);
    cache.set("b", "2".to_string(), None);
    cache.flush().await;
    assert!(backing.read_blob(NS).unwrap().is_some());
    assert_eq!(
      cache.stats(),
      CacheStats {
        size: 2,
        keys: vec!["a".to_string(), "b".to_string()],
      }
    );

    cache.clear();
    assert_eq!(cache.stats().size, 0);
    assert_eq!(cache.get("a"), None);
    assert_eq!(cache.get_stale("a"), None);

    cache.flush().await;
    assert_eq!(backing.read_blob(NS).unwrap(), None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_reload_keeps_only_unexpired_entries() {
    let backing: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    {
      let cache = store_with(backing.clone());
      cache.set("keep", "fresh".to_string(), None);
      cache.set("drop", "short".to_string(), Some(Duration::from_secs(10)));
      cache.flush().await;
    }
    tokio::time::advance(Duration::from_secs(30)).await;

    let reloaded = store_with(backing);
    assert_eq!(reloaded.get("keep"), Some("fresh".to_string()));
    assert_eq!(reloaded.get_stale("drop"), None);
  }

  #[test]
  fn test_corrupt_snapshot_starts_empty() {
    let backing = Arc::new(MemoryBlobStore::new());
    backing.write_blob(NS, b"{not json").unwrap();

    let cache = store_with(backing);
    assert_eq!(cache.stats().size, 0);
  }

  #[tokio::test]
  async fn test_persistence_failure_does_not_fail_set() {
    let cache = store_with(Arc::new(FailingBlobStore));
    cache.set("k", "v".to_string(), None);
    cache.flush().await;
    assert_eq!(cache.get("k"), Some("v".to_string()));
    cache.clear();
    cache.flush().await;
    assert_eq!(cache.stats().size, 0);
  }

  #[tokio::test]
  async fn test_set_returns_before_durable_write() {
    let (backing, release) = GatedBlobStore::new();
    let cache = store_with(backing.clone());

    cache.set("k", "v".to_string(), None);
    // the write is still parked on the gate, yet the value is served
    assert_eq!(cache.get("k"), Some("v".to_string()));
    assert_eq!(backing.read_blob(NS).unwrap(), None);

    release.send(()).unwrap();
    cache.flush().await;
    assert!(backing.read_blob(NS).unwrap().is_some());
  }

  #[tokio::test]
  async fn test_newest_snapshot_wins() {
    let backing: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let cache = store_with(backing.clone());
    for i in 0..20 {
      cache.set(&format!("k{i}"), i.to_string(), None);
    }
    cache.flush().await;

    let reloaded = store_with(backing);
    assert_eq!(reloaded.stats().size, 20);
  }

  #[tokio::test(start_paused = true)]
  async fn test_capacity_evicts_expired_then_oldest() {
    let cache = store_with(Arc::new(MemoryBlobStore::new())).with_max_entries(Some(2));
    cache.set("expired", "x".to_string(), Some(Duration::from_secs(5)));
    tokio::time::advance(Duration::from_secs(10)).await;
    cache.set("first", "1".to_string(), None);
    tokio::time::advance(Duration::from_secs(1)).await;
    cache.set("second", "2".to_string(), None);
    assert_eq!(cache.stats().keys, vec!["first".to_string(), "second".to_string()]);

    cache.set("third", "3".to_string(), None);
    assert_eq!(cache.stats().keys, vec!["second".to_string(), "third".to_string()]);
  }

  #[tokio::test(start_paused = true)]
  async fn test_get_purges_entries_past_retention() {
    let cache = store_with(Arc::new(MemoryBlobStore::new()))
      .with_stale_retention(Duration::from_secs(60));
    cache.set("old", "x".to_string(), Some(Duration::from_secs(5)));
    cache.set("live", "y".to_string(), None);

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(cache.get("live"), Some("y".to_string()));
    assert_eq!(cache.get_stale("old"), Some("x".to_string()));

    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(cache.get("live"), Some("y".to_string()));
    assert_eq!(cache.get_stale("old"), None);
  }
}
