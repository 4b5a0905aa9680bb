//! Request descriptors passed through the offline layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Query parameters, ordered so that derived cache keys are deterministic.
pub type QueryParams = BTreeMap<String, String>;

/// Extra request headers carried by a mutation.
pub type Headers = BTreeMap<String, String>;

/// A request to the remote API.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiRequest {
  /// Side-effect free read (GET), eligible for caching.
  Read(ReadRequest),
  /// State-changing request, eligible for queueing.
  Write(Mutation),
}

impl ApiRequest {
  pub fn path(&self) -> &str {
    match self {
      Self::Read(read) => &read.path,
      Self::Write(mutation) => mutation.path(),
    }
  }

  pub fn method(&self) -> &'static str {
    match self {
      Self::Read(_) => "GET",
      Self::Write(mutation) => mutation.method(),
    }
  }
}

impl From<ReadRequest> for ApiRequest {
  fn from(read: ReadRequest) -> Self {
    Self::Read(read)
  }
}

impl From<Mutation> for ApiRequest {
  fn from(mutation: Mutation) -> Self {
    Self::Write(mutation)
  }
}

/// A GET request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
  pub path: String,
  #[serde(default)]
  pub query: QueryParams,
}

impl ReadRequest {
  pub fn new(path: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      query: QueryParams::new(),
    }
  }

  pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.query.insert(key.into(), value.into());
    self
  }
}

/// A state-changing request. Each method carries only the fields it uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "UPPERCASE")]
pub enum Mutation {
  Post {
    path: String,
    #[serde(default)]
    query: QueryParams,
    #[serde(default)]
    body: Value,
    #[serde(default)]
    headers: Headers,
  },
  Put {
    path: String,
    #[serde(default)]
    query: QueryParams,
    #[serde(default)]
    body: Value,
    #[serde(default)]
    headers: Headers,
  },
  Delete {
    path: String,
    #[serde(default)]
    query: QueryParams,
    #[serde(default)]
    headers: Headers,
  },
}

impl Mutation {
  pub fn post(path: impl Into<String>, body: Value) -> Self {
    Self::Post {
      path: path.into(),
      query: QueryParams::new(),
      body,
      headers: Headers::new(),
    }
  }

  pub fn put(path: impl Into<String>, body: Value) -> Self {
    Self::Put {
      path: path.into(),
      query: QueryParams::new(),
      body,
      headers: Headers::new(),
    }
  }

  pub fn delete(path: impl Into<String>) -> Self {
    Self::Delete {
      path: path.into(),
      query: QueryParams::new(),
      headers: Headers::new(),
    }
  }

  pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    match &mut self {
      Self::Post { query, .. } | Self::Put { query, .. } | Self::Delete { query, .. } => {
        query.insert(key.into(), value.into());
      }
    }
    self
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    match &mut self {
      Self::Post { headers, .. } | Self::Put { headers, .. } | Self::Delete { headers, .. } => {
        headers.insert(name.into(), value.into());
      }
    }
    self
  }

  pub fn method(&self) -> &'static str {
    match self {
      Self::Post { .. } => "POST",
      Self::Put { .. } => "PUT",
      Self::Delete { .. } => "DELETE",
    }
  }

  pub fn path(&self) -> &str {
    match self {
      Self::Post { path, .. } | Self::Put { path, .. } | Self::Delete { path, .. } => path,
    }
  }

  pub fn query(&self) -> &QueryParams {
    match self {
      Self::Post { query, .. } | Self::Put { query, .. } | Self::Delete { query, .. } => query,
    }
  }

  pub fn headers(&self) -> &Headers {
    match self {
      Self::Post { headers, .. } | Self::Put { headers, .. } | Self::Delete { headers, .. } => {
        headers
      }
    }
  }

  /// Request body, if this method carries one.
  pub fn body(&self) -> Option<&Value> {
    match self {
      Self::Post { body, .. } | Self::Put { body, .. } => Some(body),
      Self::Delete { .. } => None,
    }
  }
}
