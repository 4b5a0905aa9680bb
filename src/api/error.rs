use serde_json::Value;
use thiserror::Error;

use crate::offline::{ClassifyFailure, FailureKind};

/// Failures surfaced by the API client.
#[derive(Debug, Error)]
pub enum ApiError {
  /// No response could be obtained (connectivity or transport failure).
  #[error("network unavailable: {0}")]
  NetworkUnavailable(String),

  /// The server rejected the request (4xx); retrying will not help.
  #[error("request rejected with status {status}")]
  PermanentClientError { status: u16, body: Value },

  /// Server-side failure (5xx) or a failure without a definitive status.
  #[error("server error: {message}")]
  TransientServerError { status: Option<u16>, message: String },

  /// The server answered 401; the session has been cleared.
  #[error("session expired")]
  AuthExpired,

  /// The request could not be built (bad path or header).
  #[error("invalid request: {0}")]
  InvalidRequest(String),
}

impl ApiError {
  /// Map a non-success, non-401 HTTP status.
  pub fn from_status(status: u16, body: Value) -> Self {
    match FailureKind::from_status(Some(status)) {
      FailureKind::Permanent => Self::PermanentClientError { status, body },
      FailureKind::Transient => Self::TransientServerError {
        status: Some(status),
        message: match body {
          Value::String(s) => s,
          Value::Null => format!("status {}", status),
          other => other.to_string(),
        },
      },
    }
  }

  /// HTTP status carried by this error, if a response was received.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::PermanentClientError { status, .. } => Some(*status),
      Self::TransientServerError { status, .. } => *status,
      Self::AuthExpired => Some(401),
      Self::NetworkUnavailable(_) | Self::InvalidRequest(_) => None,
    }
  }

  pub fn is_network(&self) -> bool {
    matches!(self, Self::NetworkUnavailable(_))
  }
}

impl ClassifyFailure for ApiError {
  /// Only a real 4xx response is permanent. Failures without a status,
  /// including requests that could not be built, stay queued.
  fn failure_kind(&self) -> FailureKind {
    FailureKind::from_status(self.status())
  }
}
