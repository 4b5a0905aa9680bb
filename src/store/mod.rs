//! Durable key-value storage backing the offline queue, the response cache
//! and the session token.
//!
//! Stores never raise write failures. A `set` that cannot be applied (I/O
//! error, quota exhaustion) is logged, reported as `false`, and the previously
//! stored value stays in place.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Default storage budget, matching what browsers grant to local storage.
pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

/// Trait for durable storage backends.
pub trait DurableStore: Send + Sync {
  /// Read the value stored under `key`.
  fn get(&self, key: &str) -> Option<String>;

  /// Store `value` under `key`, replacing any previous value.
  ///
  /// Returns whether the write was applied. Failures are logged and leave
  /// the prior state unchanged.
  fn set(&self, key: &str, value: &str) -> bool;

  /// Remove `key`. Removing an absent key is a no-op.
  fn remove(&self, key: &str);
}

/// Check whether replacing a value keeps the store within its quota.
///
/// `used` is the byte total of every stored value other than the one being
/// replaced.
fn fits_quota(used: u64, incoming: usize, quota: u64) -> bool {
  used.saturating_add(incoming as u64) <= quota
}
