//! SQLite-backed durable store.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::{fits_quota, DurableStore};

/// Schema for the key-value table.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite-based store. One row per key.
pub struct SqliteStore {
  conn: Mutex<Connection>,
  quota_bytes: u64,
}

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open_default(quota_bytes: u64) -> Result<Self> {
    Self::open(&Self::default_path()?, quota_bytes)
  }

  /// Open or create the store at `path`.
  pub fn open(path: &Path, quota_bytes: u64) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create storage directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
      quota_bytes,
    };
    store.run_migrations()?;

    tracing::debug!(path = %path.display(), "opened durable store");
    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("splitsync").join("store.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(())
  }

  fn try_set(&self, key: &str, value: &str) -> rusqlite::Result<bool> {
    let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

    let used: i64 = conn.query_row(
      "SELECT COALESCE(SUM(length(CAST(value AS BLOB))), 0) FROM kv_store WHERE key != ?",
      params![key],
      |row| row.get(0),
    )?;

    if !fits_quota(used.max(0) as u64, value.len(), self.quota_bytes) {
      return Ok(false);
    }

    conn.execute(
      "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, datetime('now'))",
      params![key, value],
    )?;

    Ok(true)
  }
}

impl DurableStore for SqliteStore {
  fn get(&self, key: &str) -> Option<String> {
    let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

    conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .unwrap_or_else(|e| {
        tracing::warn!(key, error = %e, "failed to read from store");
        None
      })
  }

  fn set(&self, key: &str, value: &str) -> bool {
    match self.try_set(key, value) {
      Ok(true) => true,
      Ok(false) => {
        tracing::warn!(
          key,
          bytes = value.len(),
          quota = self.quota_bytes,
          "storage quota exceeded, write dropped"
        );
        false
      }
      Err(e) => {
        tracing::warn!(key, error = %e, "failed to write to store");
        false
      }
    }
  }

  fn remove(&self, key: &str) {
    let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

    if let Err(e) = conn.execute("DELETE FROM kv_store WHERE key = ?", params![key]) {
      tracing::warn!(key, error = %e, "failed to remove from store");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::DEFAULT_QUOTA_BYTES;
  use tempfile::TempDir;

  #[test]
  fn test_values_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("store.db");

    {
      let store = SqliteStore::open(&path, DEFAULT_QUOTA_BYTES).unwrap();
      store.set("token", "abc");
      store.set("gone", "x");
      store.remove("gone");
    }

    let store = SqliteStore::open(&path, DEFAULT_QUOTA_BYTES).unwrap();
    assert_eq!(store.get("token").as_deref(), Some("abc"));
    assert_eq!(store.get("gone"), None);
  }

  #[test]
  fn test_overwrite_replaces_value() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(&dir.path().join("store.db"), DEFAULT_QUOTA_BYTES).unwrap();

    store.set("k", "first");
    store.set("k", "second");
    assert_eq!(store.get("k").as_deref(), Some("second"));
  }

  #[test]
  fn test_quota_exhaustion_does_not_clobber() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(&dir.path().join("store.db"), 10).unwrap();

    assert!(store.set("k", "12345"));
    assert!(!store.set("k", "this value is far too long"));
    assert_eq!(store.get("k").as_deref(), Some("12345"));

    assert!(!store.set("other", "123456"));
    assert_eq!(store.get("other"), None);
  }
}
