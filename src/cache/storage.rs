//! Durable blob storage backing the cache snapshot, with a SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Durable key-value slot store.
///
/// The cache writes its whole serialized map under one namespace key.
pub trait BlobStore: Send + Sync {
  /// Read the blob stored under `namespace_key`, if any.
  fn read_blob(&self, namespace_key: &str) -> Result<Option<Vec<u8>>>;

  /// Replace the blob stored under `namespace_key`.
  fn write_blob(&self, namespace_key: &str, bytes: &[u8]) -> Result<()>;

  /// Remove the blob stored under `namespace_key`.
  fn delete_blob(&self, namespace_key: &str) -> Result<()>;
}

/// Storage implementation that doesn't persist anything.
/// Used when persistence is disabled - all operations are no-ops.
pub struct NoopBlobStore;

impl BlobStore for NoopBlobStore {
  fn read_blob(&self, _namespace_key: &str) -> Result<Option<Vec<u8>>> {
    Ok(None) // Always empty
  }

  fn write_blob(&self, _namespace_key: &str, _bytes: &[u8]) -> Result<()> {
    Ok(()) // Discard
  }

  fn delete_blob(&self, _namespace_key: &str) -> Result<()> {
    Ok(())
  }
}

/// Process-local blob store, useful for tests and embedding hosts.
#[derive(Default)]
pub struct MemoryBlobStore {
  blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl BlobStore for MemoryBlobStore {
  fn read_blob(&self, namespace_key: &str) -> Result<Option<Vec<u8>>> {
    let blobs = self
      .blobs
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(blobs.get(namespace_key).cloned())
  }

  fn write_blob(&self, namespace_key: &str, bytes: &[u8]) -> Result<()> {
    let mut blobs = self
      .blobs
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    blobs.insert(namespace_key.to_string(), bytes.to_vec());
    Ok(())
  }

  fn delete_blob(&self, namespace_key: &str) -> Result<()> {
    let mut blobs = self
      .blobs
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    blobs.remove(namespace_key);
    Ok(())
  }
}

/// SQLite-based blob storage implementation.
pub struct SqliteBlobStore {
  conn: Mutex<Connection>,
}

impl SqliteBlobStore {
  /// Open the blob store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the blob store at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a store that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("listing-feed").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(BLOB_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

const BLOB_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS blob_store (
    namespace_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl BlobStore for SqliteBlobStore {
  fn read_blob(&self, namespace_key: &str) -> Result<Option<Vec<u8>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT data FROM blob_store WHERE namespace_key = ?",
        params![namespace_key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read blob {}: {}", namespace_key, e))
  }

  fn write_blob(&self, namespace_key: &str, bytes: &[u8]) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO blob_store (namespace_key, data, written_at)
         VALUES (?, ?, datetime('now'))",
        params![namespace_key, bytes],
      )
      .map_err(|e| eyre!("Failed to write blob {}: {}", namespace_key, e))?;

    Ok(())
  }

  fn delete_blob(&self, namespace_key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM blob_store WHERE namespace_key = ?",
        params![namespace_key],
      )
      .map_err(|e| eyre!("Failed to delete blob {}: {}", namespace_key, e))?;

    Ok(())
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sqlite_write_read_delete() {
    let store = SqliteBlobStore::open_in_memory().unwrap();
    assert_eq!(store.read_blob("ns").unwrap(), None);

    store.write_blob("ns", b"first").unwrap();
    store.write_blob("ns", b"second").unwrap();
    assert_eq!(store.read_blob("ns").unwrap(), Some(b"second".to_vec()));

    store.delete_blob("ns").unwrap();
    assert_eq!(store.read_blob("ns").unwrap(), None);
  }

  #[test]
  fn test_sqlite_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    {
      let store = SqliteBlobStore::open_at(&path).unwrap();
      store.write_blob("ns", b"payload").unwrap();
    }

    let reopened = SqliteBlobStore::open_at(&path).unwrap();
    assert_eq!(reopened.read_blob("ns").unwrap(), Some(b"payload".to_vec()));
  }

  #[test]
  fn test_noop_store_never_returns_data() {
    let store = NoopBlobStore;
    store.write_blob("ns", b"payload").unwrap();
    assert_eq!(store.read_blob("ns").unwrap(), None);
  }
}
