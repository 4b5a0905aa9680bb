//! Queued mutations awaiting replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::Mutation;

/// Store key holding the serialized queue.
pub const QUEUE_KEY: &str = "offline_mutation_queue";

/// Identifier of a queued mutation. Derived from the enqueue time in
/// milliseconds and strictly increasing within a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueItemId(u64);

impl QueueItemId {
  pub fn as_u64(self) -> u64 {
    self.0
  }
}

impl std::fmt::Display for QueueItemId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// One pending mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
  pub id: QueueItemId,
  pub request: Mutation,
  pub enqueued_at: DateTime<Utc>,
}

/// Hands out queue ids from a millisecond clock, never repeating.
#[derive(Debug, Default)]
pub(crate) struct IdGenerator {
  last: u64,
}

impl IdGenerator {
  /// Resume after the highest id already in use.
  pub(crate) fn resume(items: &[QueueItem]) -> Self {
    Self {
      last: items.iter().map(|i| i.id.0).max().unwrap_or(0),
    }
  }

  pub(crate) fn next(&mut self, now: DateTime<Utc>) -> QueueItemId {
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    self.last = millis.max(self.last + 1);
    QueueItemId(self.last)
  }
}
