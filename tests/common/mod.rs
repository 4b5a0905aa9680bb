//! Shared setup for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use url::Url;

use splitsync::api::{ApiClient, Session};
use splitsync::connectivity::ConnectivityMonitor;
use splitsync::offline::OfflineManager;
use splitsync::store::{DurableStore, MemoryStore};

/// Base URL of a port nothing listens on.
pub const UNREACHABLE: &str = "http://127.0.0.1:1/api";

pub struct Harness<S: DurableStore + 'static> {
  pub store: Arc<S>,
  pub connectivity: ConnectivityMonitor,
  pub client: ApiClient<S>,
}

impl<S: DurableStore + 'static> Harness<S> {
  pub fn with_store(store: Arc<S>, base_url: &str, online: bool) -> Self {
    let connectivity = ConnectivityMonitor::new(online);
    let offline = Arc::new(OfflineManager::new(Arc::clone(&store), connectivity.clone()));
    let session = Arc::new(Session::new(Arc::clone(&store)));
    let client = ApiClient::new(Url::parse(base_url).unwrap(), offline, session).unwrap();

    Self {
      store,
      connectivity,
      client,
    }
  }

  pub fn queue_size(&self) -> usize {
    self.client.offline().queue_size()
  }
}

impl Harness<MemoryStore> {
  pub fn new(base_url: &str, online: bool) -> Self {
    Self::with_store(Arc::new(MemoryStore::new()), base_url, online)
  }
}

/// Base URL for a mock server, mirroring the deployed `/api` prefix.
pub fn api_url(server: &wiremock::MockServer) -> String {
  format!("{}/api", server.uri())
}

/// Wait until the queue reaches `expected`, failing after a second.
pub async fn wait_for_queue_size<S: DurableStore + 'static>(harness: &Harness<S>, expected: usize) {
  let mut rx = harness.client.offline().subscribe_queue();
  tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|size| *size == expected))
    .await
    .expect("queue size not reached in time")
    .expect("queue channel closed");
}
