//! Bearer credential and login redirection.

use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

use crate::store::DurableStore;

/// Store key holding the bearer token.
pub const TOKEN_KEY: &str = "token";

/// Routes that never trigger a login redirect.
const AUTH_ROUTES: [&str; 2] = ["/login", "/register"];

/// Session notifications for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
  /// The credential was rejected; the UI should navigate to `location`.
  LoginRequired { location: String },
  /// The user logged out explicitly.
  LoggedOut,
}

/// Holds the bearer token and the route the UI is currently showing.
pub struct Session<S: DurableStore> {
  store: Arc<S>,
  /// Token held for this process only, never written to the store
  ephemeral: RwLock<Option<String>>,
  route: RwLock<String>,
  events: broadcast::Sender<SessionEvent>,
}

impl<S: DurableStore> Session<S> {
  pub fn new(store: Arc<S>) -> Self {
    let (events, _rx) = broadcast::channel(16);
    Self {
      store,
      ephemeral: RwLock::new(None),
      route: RwLock::new("/".to_string()),
      events,
    }
  }

  pub fn token(&self) -> Option<String> {
    self
      .ephemeral
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
      .or_else(|| self.store.get(TOKEN_KEY))
  }

  pub fn is_authenticated(&self) -> bool {
    self.token().is_some()
  }

  /// Start a session that survives restarts.
  ///
  /// When the store refuses the token it is kept for this process only.
  pub fn login(&self, token: &str) {
    if self.store.set(TOKEN_KEY, token) {
      self.set_ephemeral(None);
      tracing::info!("session started");
    } else {
      self.set_ephemeral(Some(token.to_string()));
      tracing::warn!("session started, token could not be persisted");
    }
  }

  /// Use `token` for this process without persisting it. It takes
  /// precedence over a stored token.
  pub fn login_ephemeral(&self, token: &str) {
    self.set_ephemeral(Some(token.to_string()));
    tracing::info!("session started for this process");
  }

  /// Explicit logout. Cached and queued payloads are left in place.
  pub fn logout(&self) {
    self.clear_token();
    tracing::info!("logged out");
    let _ = self.events.send(SessionEvent::LoggedOut);
  }

  /// Clear the credential after a 401 and ask the UI to show the login
  /// page, unless it already shows an auth page.
  pub fn expire(&self) {
    self.clear_token();

    let route = self.route();
    let path = route.split('?').next().unwrap_or_default();
    if AUTH_ROUTES.contains(&path) {
      tracing::debug!(route = %route, "session expired on auth page");
      return;
    }

    let location = login_location(&route);
    tracing::warn!(location = %location, "session expired, login required");
    let _ = self.events.send(SessionEvent::LoginRequired { location });
  }

  /// Record the route the UI is showing (path plus query).
  pub fn set_route(&self, route: impl Into<String>) {
    *self.route.write().unwrap_or_else(PoisonError::into_inner) = route.into();
  }

  pub fn route(&self) -> String {
    self
      .route
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
    self.events.subscribe()
  }

  fn set_ephemeral(&self, token: Option<String>) {
    *self.ephemeral.write().unwrap_or_else(PoisonError::into_inner) = token;
  }

  fn clear_token(&self) {
    self.set_ephemeral(None);
    self.store.remove(TOKEN_KEY);
  }
}

/// Login page location that returns to `route` afterwards.
fn login_location(route: &str) -> String {
  let encoded: String = url::form_urlencoded::byte_serialize(route.as_bytes()).collect();
  format!("/login?redirect={}", encoded)
}
