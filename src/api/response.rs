use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::offline::{CacheEntry, QueueItemId};

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOrigin {
  /// Real response from the API
  Network,
  /// Mutation was queued for later replay; nothing was executed yet
  Queued { item_id: QueueItemId },
  /// Network unavailable, serving the last cached response
  Cache { cached_at: DateTime<Utc> },
}

/// Response returned to callers, real or synthetic.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
  pub status: u16,
  pub body: Value,
  pub origin: ResponseOrigin,
}

impl ApiResponse {
  pub fn from_network(status: u16, body: Value) -> Self {
    Self {
      status,
      body,
      origin: ResponseOrigin::Network,
    }
  }

  /// Synthetic success for a mutation deferred to the offline queue.
  pub fn queued(item_id: QueueItemId) -> Self {
    Self {
      status: 200,
      body: Value::Null,
      origin: ResponseOrigin::Queued { item_id },
    }
  }

  /// Synthetic success served from the response cache.
  pub fn from_cache(entry: CacheEntry) -> Self {
    Self {
      status: 200,
      body: entry.payload,
      origin: ResponseOrigin::Cache {
        cached_at: entry.timestamp,
      },
    }
  }

  pub fn is_queued(&self) -> bool {
    matches!(self.origin, ResponseOrigin::Queued { .. })
  }

  pub fn is_from_cache(&self) -> bool {
    matches!(self.origin, ResponseOrigin::Cache { .. })
  }
}
