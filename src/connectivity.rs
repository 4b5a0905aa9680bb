//! Process-wide network reachability flag.
//!
//! The flag is a heuristic: a host can look reachable while the API endpoint
//! itself is not, so callers still classify individual request failures.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

/// Budget for a single reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Shared handle to the connectivity state. Clones observe the same flag.
#[derive(Clone)]
pub struct ConnectivityMonitor {
  tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
  pub fn new(online: bool) -> Self {
    let (tx, _rx) = watch::channel(online);
    Self { tx: Arc::new(tx) }
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Record the current reachability. Subscribers are only woken on a change.
  pub fn set_online(&self, online: bool) {
    let changed = self.tx.send_if_modified(|current| {
      if *current == online {
        false
      } else {
        *current = online;
        true
      }
    });

    if changed {
      if online {
        tracing::info!("connectivity restored");
      } else {
        tracing::warn!("connectivity lost");
      }
    }
  }

  /// Subscribe to connectivity transitions.
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }

  /// Periodically probe `target` and feed the result into this monitor.
  pub fn spawn_probe(&self, target: ProbeTarget, interval: Duration) -> JoinHandle<()> {
    let monitor = self.clone();

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      loop {
        ticker.tick().await;
        monitor.set_online(target.probe().await);
      }
    })
  }
}

/// Host and port used to decide whether the API is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
  host: String,
  port: u16,
}

impl ProbeTarget {
  pub fn new(host: impl Into<String>, port: u16) -> Self {
    Self {
      host: host.into(),
      port,
    }
  }

  /// Derive the probe target from an API base URL.
  pub fn from_url(url: &Url) -> Option<Self> {
    Some(Self::new(url.host_str()?, url.port_or_known_default()?))
  }

  /// Attempt one TCP connection.
  pub async fn probe(&self) -> bool {
    let addr = (self.host.as_str(), self.port);
    match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(addr)).await {
      Ok(Ok(_)) => true,
      Ok(Err(e)) => {
        tracing::debug!(host = %self.host, port = self.port, error = %e, "probe failed");
        false
      }
      Err(_) => {
        tracing::debug!(host = %self.host, port = self.port, "probe timed out");
        false
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::net::TcpListener;

  #[tokio::test]
  async fn test_subscribers_see_transitions_only() {
    let monitor = ConnectivityMonitor::new(true);
    let mut rx = monitor.subscribe();

    monitor.set_online(true);
    assert!(!rx.has_changed().unwrap());

    monitor.set_online(false);
    assert!(rx.has_changed().unwrap());
    assert!(!*rx.borrow_and_update());
    assert!(!monitor.is_online());
  }

  #[tokio::test]
  async fn test_clones_share_state() {
    let monitor = ConnectivityMonitor::new(false);
    let other = monitor.clone();
    other.set_online(true);
    assert!(monitor.is_online());
  }

  #[test]
  fn test_probe_target_from_url() {
    let url = Url::parse("https://api.example.com/api").unwrap();
    assert_eq!(
      ProbeTarget::from_url(&url),
      Some(ProbeTarget::new("api.example.com", 443))
    );

    let url = Url::parse("http://localhost:8000/api").unwrap();
    assert_eq!(
      ProbeTarget::from_url(&url),
      Some(ProbeTarget::new("localhost", 8000))
    );
  }

  #[tokio::test]
  async fn test_probe_reports_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    assert!(ProbeTarget::new("127.0.0.1", port).probe().await);

    drop(listener);
    assert!(!ProbeTarget::new("127.0.0.1", port).probe().await);
  }
}
