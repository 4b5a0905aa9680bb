//! Offline-first request layer.
//!
//! This module provides:
//! - A durable, ordered queue of mutations made while the API was unreachable
//! - A flat cache of the last successful response for every read
//! - Sequential replay ("drain") of the queue once connectivity returns

mod cache;
mod manager;
mod queue;
mod request;

pub use cache::{CacheEntry, CacheKey, CACHE_PREFIX};
pub use manager::{DrainReport, OfflineManager, QueuePersistError};
pub use queue::{QueueItem, QueueItemId, QUEUE_KEY};
pub use request::{ApiRequest, Headers, Mutation, QueryParams, ReadRequest};

/// How a drain treats a failed replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
  /// Retrying reproduces the same failure; the item is discarded.
  Permanent,
  /// Retrying might succeed; the item stays queued.
  Transient,
}

impl FailureKind {
  /// Client errors (4xx) are permanent. Everything else, including failures
  /// without any status, is transient.
  pub fn from_status(status: Option<u16>) -> Self {
    match status {
      Some(400..=499) => Self::Permanent,
      _ => Self::Transient,
    }
  }
}

/// Errors a replay can fail with.
pub trait ClassifyFailure {
  fn failure_kind(&self) -> FailureKind;
}
