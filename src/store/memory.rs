//! In-memory store used for ephemeral sessions and tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::{fits_quota, DurableStore, DEFAULT_QUOTA_BYTES};

/// Store that keeps everything in a process-local map.
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
  quota_bytes: u64,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::with_quota(DEFAULT_QUOTA_BYTES)
  }

  /// Create a store that rejects writes once `quota_bytes` of values are held.
  pub fn with_quota(quota_bytes: u64) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      quota_bytes,
    }
  }

  pub fn len(&self) -> usize {
    self
      .entries
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl DurableStore for MemoryStore {
  fn get(&self, key: &str) -> Option<String> {
    self
      .entries
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(key)
      .cloned()
  }

  fn set(&self, key: &str, value: &str) -> bool {
    let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

    let used: u64 = entries
      .iter()
      .filter(|(k, _)| k.as_str() != key)
      .map(|(_, v)| v.len() as u64)
      .sum();

    if !fits_quota(used, value.len(), self.quota_bytes) {
      tracing::warn!(
        key,
        bytes = value.len(),
        quota = self.quota_bytes,
        "storage quota exceeded, write dropped"
      );
      return false;
    }

    entries.insert(key.to_string(), value.to_string());
    true
  }

  fn remove(&self, key: &str) {
    self
      .entries
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(key);
  }
}
