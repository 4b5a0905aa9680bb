//! API client that routes requests through the offline layer.

use color_eyre::{eyre::eyre, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use url::Url;

use super::error::ApiError;
use super::response::ApiResponse;
use super::session::Session;
use crate::offline::{
  ApiRequest, CacheKey, DrainReport, Headers, Mutation, OfflineManager, ReadRequest,
};
use crate::store::DurableStore;

/// HTTP client with transparent offline support.
///
/// Successful reads are cached. When the API is unreachable, mutations are
/// queued and answered with a synthetic success, and reads are answered from
/// the cache when possible.
pub struct ApiClient<S: DurableStore> {
  http: reqwest::Client,
  base_url: Url,
  offline: Arc<OfflineManager<S>>,
  session: Arc<Session<S>>,
}

impl<S: DurableStore> Clone for ApiClient<S> {
  fn clone(&self) -> Self {
    Self {
      http: self.http.clone(),
      base_url: self.base_url.clone(),
      offline: Arc::clone(&self.offline),
      session: Arc::clone(&self.session),
    }
  }
}

impl<S: DurableStore + 'static> ApiClient<S> {
  pub fn new(
    base_url: Url,
    offline: Arc<OfflineManager<S>>,
    session: Arc<Session<S>>,
  ) -> Result<Self> {
    let http = reqwest::Client::builder()
      .user_agent(concat!("splitsync/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      offline,
      session,
    })
  }

  pub fn offline(&self) -> &Arc<OfflineManager<S>> {
    &self.offline
  }

  pub fn session(&self) -> &Arc<Session<S>> {
    &self.session
  }

  pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
    self.send(ReadRequest::new(path).into()).await
  }

  pub async fn post(&self, path: &str, body: Value) -> Result<ApiResponse, ApiError> {
    self.send(Mutation::post(path, body).into()).await
  }

  pub async fn put(&self, path: &str, body: Value) -> Result<ApiResponse, ApiError> {
    self.send(Mutation::put(path, body).into()).await
  }

  pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
    self.send(Mutation::delete(path).into()).await
  }

  /// Send a request, falling back to the offline queue or cache when the
  /// network is unavailable.
  pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
    if !self.offline.connectivity().is_online() {
      tracing::debug!(
        method = request.method(),
        path = request.path(),
        "offline, skipping network attempt"
      );
      let error = ApiError::NetworkUnavailable("connectivity monitor reports offline".into());
      return self.fall_back(request, error);
    }

    match self.dispatch(&request).await {
      Ok(response) => {
        if let ApiRequest::Read(read) = &request {
          self
            .offline
            .cache_response(&CacheKey::for_read(read), response.body.clone());
        }
        Ok(response)
      }
      Err(e) if self.is_network_failure(&e) => {
        tracing::warn!(
          method = request.method(),
          path = request.path(),
          error = %e,
          "network failure"
        );
        self.fall_back(request, e)
      }
      Err(e) => {
        self.on_http_error(&e);
        Err(e)
      }
    }
  }

  /// Send a queued mutation. Never re-enqueues; the current token is attached.
  pub async fn replay(&self, mutation: Mutation) -> Result<ApiResponse, ApiError> {
    let result = self.dispatch(&ApiRequest::Write(mutation)).await;
    if let Err(e) = &result {
      if !self.is_network_failure(e) {
        self.on_http_error(e);
      }
    }
    result
  }

  /// Replay the offline queue now.
  pub async fn sync(&self) -> Option<DrainReport> {
    self.offline.drain(|mutation| self.replay(mutation)).await
  }

  /// Replay the offline queue every time connectivity returns.
  pub fn spawn_auto_sync(&self) -> JoinHandle<()> {
    let client = self.clone();
    self.offline.spawn_auto_drain(move |mutation| {
      let client = client.clone();
      async move { client.replay(mutation).await }
    })
  }

  fn fall_back(&self, request: ApiRequest, error: ApiError) -> Result<ApiResponse, ApiError> {
    match request {
      ApiRequest::Write(mutation) => match self.offline.enqueue(mutation) {
        Ok(item) => Ok(ApiResponse::queued(item.id)),
        Err(_) => Err(error),
      },
      ApiRequest::Read(read) => {
        let key = CacheKey::for_read(&read);
        match self.offline.get_cached(&key) {
          Some(entry) => {
            tracing::debug!(key = %key, cached_at = %entry.timestamp, "serving cached response");
            Ok(ApiResponse::from_cache(entry))
          }
          None => Err(error),
        }
      }
    }
  }

  fn is_network_failure(&self, error: &ApiError) -> bool {
    error.is_network() || !self.offline.connectivity().is_online()
  }

  /// Handle errors that carry a real HTTP response.
  fn on_http_error(&self, error: &ApiError) {
    if matches!(error, ApiError::AuthExpired) {
      self.session.expire();
    }
  }

  async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
    let url = self.url_for(request.path())?;

    let mut builder = match request {
      ApiRequest::Read(read) => self.http.get(url).query(&read.query),
      ApiRequest::Write(mutation) => {
        let builder = match mutation {
          Mutation::Post { .. } => self.http.post(url),
          Mutation::Put { .. } => self.http.put(url),
          Mutation::Delete { .. } => self.http.delete(url),
        };
        let builder = with_headers(builder.query(mutation.query()), mutation.headers());
        match mutation.body() {
          Some(body) if !body.is_null() => builder.json(body),
          _ => builder,
        }
      }
    };

    if let Some(token) = self.session.token() {
      builder = builder.bearer_auth(token);
    }

    let response = builder.send().await.map_err(transport_error)?;
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;
    let body = parse_body(&text);

    tracing::debug!(
      method = request.method(),
      path = request.path(),
      status = status.as_u16(),
      "response"
    );

    if status.is_success() {
      Ok(ApiResponse::from_network(status.as_u16(), body))
    } else if status == StatusCode::UNAUTHORIZED {
      Err(ApiError::AuthExpired)
    } else {
      Err(ApiError::from_status(status.as_u16(), body))
    }
  }

  fn url_for(&self, path: &str) -> Result<Url, ApiError> {
    let base = self.base_url.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Url::parse(&format!("{}/{}", base, path))
      .map_err(|e| ApiError::InvalidRequest(format!("{}: {}", path, e)))
  }
}

fn with_headers(builder: RequestBuilder, headers: &Headers) -> RequestBuilder {
  headers
    .iter()
    .fold(builder, |builder, (name, value)| builder.header(name, value))
}

/// Classify an error raised before a complete response was read.
fn transport_error(e: reqwest::Error) -> ApiError {
  if e.is_builder() {
    ApiError::InvalidRequest(e.to_string())
  } else {
    ApiError::NetworkUnavailable(e.to_string())
  }
}

/// JSON bodies are parsed; anything else is kept as a string.
fn parse_body(text: &str) -> Value {
  if text.trim().is_empty() {
    return Value::Null;
  }
  serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
