//! Cache keys and entries for read responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::request::ReadRequest;

/// Prefix for cache entries in the durable store.
pub const CACHE_PREFIX: &str = "api_cache_";

/// Canonical key for a read: path followed by the serialized query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
  pub fn for_read(read: &ReadRequest) -> Self {
    let query: Map<String, Value> = read
      .query
      .iter()
      .map(|(k, v)| (k.clone(), Value::String(v.clone())))
      .collect();

    Self(format!("{}{}", read.path, Value::Object(query)))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Store key for this entry.
  ///
  /// SHA256 of the canonical key for stable, fixed-length keys.
  pub fn storage_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.0.as_bytes());
    format!("{}{}", CACHE_PREFIX, hex::encode(hasher.finalize()))
  }
}

impl std::fmt::Display for CacheKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// Last successfully observed response for one read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  /// When the response was written
  pub timestamp: DateTime<Utc>,
  /// Response body
  pub payload: Value,
}
