//! Offline manager that owns the mutation queue and the response cache.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::cache::{CacheEntry, CacheKey};
use super::queue::{IdGenerator, QueueItem, QueueItemId, QUEUE_KEY};
use super::request::Mutation;
use super::{ClassifyFailure, FailureKind};
use crate::connectivity::ConnectivityMonitor;
use crate::store::DurableStore;

/// Outcome of one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
  /// Replayed successfully and removed
  pub replayed: usize,
  /// Failed permanently and removed
  pub discarded: usize,
  /// Failed transiently and left in the queue
  pub retained: usize,
}

/// The durable store refused the updated queue; nothing was queued.
#[derive(Debug, Error)]
#[error("offline queue could not be persisted")]
pub struct QueuePersistError;

struct OfflineState {
  queue: Vec<QueueItem>,
  ids: IdGenerator,
  /// Cache keys written by this process, forgotten on reset
  cached_keys: HashSet<String>,
}

/// Queue and cache manager.
///
/// Every mutation of the queue or the cache is written through to the
/// durable store before the call returns.
pub struct OfflineManager<S: DurableStore> {
  store: Arc<S>,
  connectivity: ConnectivityMonitor,
  state: Mutex<OfflineState>,
  draining: AtomicBool,
  queue_tx: watch::Sender<usize>,
}

impl<S: DurableStore> OfflineManager<S> {
  /// Create a manager, loading any queue persisted by a previous run.
  pub fn new(store: Arc<S>, connectivity: ConnectivityMonitor) -> Self {
    let queue = load_queue(store.as_ref());
    if !queue.is_empty() {
      tracing::info!(count = queue.len(), "loaded queued mutations");
    }

    let (queue_tx, _rx) = watch::channel(queue.len());

    Self {
      store,
      connectivity,
      state: Mutex::new(OfflineState {
        ids: IdGenerator::resume(&queue),
        queue,
        cached_keys: HashSet::new(),
      }),
      draining: AtomicBool::new(false),
      queue_tx,
    }
  }

  pub fn connectivity(&self) -> &ConnectivityMonitor {
    &self.connectivity
  }

  // --- Queue (writes) ---

  /// Append a mutation to the tail of the queue.
  ///
  /// The in-memory queue only changes once the store has accepted the new
  /// queue.
  pub fn enqueue(&self, request: Mutation) -> Result<QueueItem, QueuePersistError> {
    let (item, len) = {
      let mut state = self.lock();
      let now = Utc::now();
      let item = QueueItem {
        id: state.ids.next(now),
        request,
        enqueued_at: now,
      };

      let mut queue = state.queue.clone();
      queue.push(item.clone());
      if !self.persist_queue(&queue) {
        tracing::warn!(
          method = item.request.method(),
          path = item.request.path(),
          "store refused the offline queue, mutation not queued"
        );
        return Err(QueuePersistError);
      }
      state.queue = queue;
      (item, state.queue.len())
    };

    tracing::info!(
      id = %item.id,
      method = item.request.method(),
      path = item.request.path(),
      "queued mutation for later replay"
    );
    self.queue_tx.send_replace(len);
    Ok(item)
  }

  /// Remove an item by id and report whether it was removed. Removing an
  /// absent id is a no-op.
  pub fn remove_from_queue(&self, id: QueueItemId) -> bool {
    let len = {
      let mut state = self.lock();
      if !state.queue.iter().any(|item| item.id == id) {
        return false;
      }

      let queue: Vec<QueueItem> = state
        .queue
        .iter()
        .filter(|item| item.id != id)
        .cloned()
        .collect();
      if !self.persist_queue(&queue) {
        tracing::warn!(id = %id, "store refused the offline queue, item kept");
        return false;
      }
      state.queue = queue;
      state.queue.len()
    };

    self.queue_tx.send_replace(len);
    true
  }

  pub fn queue_size(&self) -> usize {
    self.lock().queue.len()
  }

  /// Snapshot of the queue in replay order.
  pub fn pending(&self) -> Vec<QueueItem> {
    self.lock().queue.clone()
  }

  /// Subscribe to queue length changes.
  pub fn subscribe_queue(&self) -> watch::Receiver<usize> {
    self.queue_tx.subscribe()
  }

  pub fn is_draining(&self) -> bool {
    self.draining.load(Ordering::Acquire)
  }

  // --- Cache (reads) ---

  /// Store `payload` as the latest response for `key`, replacing any
  /// previous entry. Returns whether the store accepted it; a refused write
  /// keeps the previous entry.
  pub fn cache_response(&self, key: &CacheKey, payload: Value) -> bool {
    let entry = CacheEntry {
      timestamp: Utc::now(),
      payload,
    };

    let serialized = match serde_json::to_string(&entry) {
      Ok(s) => s,
      Err(e) => {
        tracing::warn!(key = %key, error = %e, "failed to serialize cache entry");
        return false;
      }
    };

    let storage_key = key.storage_key();
    if !self.store.set(&storage_key, &serialized) {
      return false;
    }
    self.lock().cached_keys.insert(storage_key);
    tracing::trace!(key = %key, "cached response");
    true
  }

  /// Look up the latest cached response for `key`.
  pub fn get_cached(&self, key: &CacheKey) -> Option<CacheEntry> {
    let raw = self.store.get(&key.storage_key())?;
    match serde_json::from_str(&raw) {
      Ok(entry) => Some(entry),
      Err(e) => {
        tracing::warn!(key = %key, error = %e, "ignoring malformed cache entry");
        None
      }
    }
  }

  // --- Replay ---

  /// Replay every queued mutation once, in queue order.
  ///
  /// Returns `None` without doing anything when a drain is already running,
  /// the queue is empty, or the monitor reports offline. Items are replayed
  /// one at a time; mutations enqueued while the drain runs wait for the next
  /// cycle.
  pub async fn drain<F, Fut, T, E>(&self, replay: F) -> Option<DrainReport>
  where
    F: Fn(Mutation) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ClassifyFailure + Display,
  {
    if !self.connectivity.is_online() {
      return None;
    }

    if self
      .draining
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      tracing::debug!("drain already running");
      return None;
    }
    let _guard = DrainGuard(&self.draining);

    let snapshot = self.pending();
    if snapshot.is_empty() {
      return None;
    }

    tracing::info!(count = snapshot.len(), "replaying queued mutations");
    let mut report = DrainReport::default();

    for item in snapshot {
      tracing::debug!(
        id = %item.id,
        method = item.request.method(),
        path = item.request.path(),
        "replaying"
      );

      match replay(item.request.clone()).await {
        Ok(_) => {
          self.remove_from_queue(item.id);
          report.replayed += 1;
        }
        Err(e) => match e.failure_kind() {
          FailureKind::Permanent => {
            tracing::warn!(id = %item.id, error = %e, "discarding rejected mutation");
            self.remove_from_queue(item.id);
            report.discarded += 1;
          }
          FailureKind::Transient => {
            tracing::warn!(id = %item.id, error = %e, "replay failed, keeping mutation queued");
            report.retained += 1;
          }
        },
      }
    }

    tracing::info!(
      replayed = report.replayed,
      discarded = report.discarded,
      retained = report.retained,
      "drain finished"
    );
    Some(report)
  }

  /// Drain whenever the connectivity monitor transitions to online.
  pub fn spawn_auto_drain<F, Fut, T, E>(self: &Arc<Self>, replay: F) -> JoinHandle<()>
  where
    S: 'static,
    F: Fn(Mutation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: ClassifyFailure + Display + Send,
  {
    let manager = Arc::clone(self);
    let mut rx = self.connectivity.subscribe();

    tokio::spawn(async move {
      while rx.changed().await.is_ok() {
        let online = *rx.borrow_and_update();
        if online {
          manager.drain(&replay).await;
        }
      }
    })
  }

  /// Drop all queued mutations and every cache entry written by this
  /// process.
  ///
  /// A drain already running keeps its guard until it finishes, so no second
  /// cycle can start alongside it.
  pub fn reset(&self) {
    let len = {
      let mut state = self.lock();
      if self.persist_queue(&[]) {
        state.queue.clear();
      }
      for key in state.cached_keys.drain() {
        self.store.remove(&key);
      }
      state.queue.len()
    };

    self.queue_tx.send_replace(len);
  }

  fn lock(&self) -> MutexGuard<'_, OfflineState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn persist_queue(&self, queue: &[QueueItem]) -> bool {
    match serde_json::to_string(queue) {
      Ok(serialized) => self.store.set(QUEUE_KEY, &serialized),
      Err(e) => {
        tracing::warn!(error = %e, "failed to serialize offline queue");
        false
      }
    }
  }
}

/// Clears the draining flag when a drain ends, including when its future is
/// dropped part way through.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

fn load_queue<S: DurableStore>(store: &S) -> Vec<QueueItem> {
  let Some(raw) = store.get(QUEUE_KEY) else {
    return Vec::new();
  };

  serde_json::from_str(&raw).unwrap_or_else(|e| {
    tracing::warn!(error = %e, "ignoring malformed offline queue");
    Vec::new()
  })
}
