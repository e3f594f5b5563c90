//! Error type for `tally-client`.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
  /// Network-level failure: connect, timeout, reset.
  #[error("transport error: {0}")]
  Transport(String),

  /// The request could not be built (bad URL, bad header value).
  #[error("invalid request: {0}")]
  Request(String),

  /// Non-success HTTP status.
  #[error("{path} returned HTTP {status}: {body}")]
  Status {
    path:        String,
    status:      u16,
    body:        String,
    retry_after: Option<Duration>,
  },

  /// Retryable failures persisted past the attempt budget.
  #[error("{operation} failed after {attempts} attempts: {last_error}")]
  Exhausted {
    operation:  String,
    attempts:   u32,
    last_error: String,
  },

  #[error("could not decode response from {path}: {source}")]
  Decode {
    path:   String,
    #[source]
    source: serde_json::Error,
  },

  #[error("report {code} ended with status {status:?}: {error}")]
  ReportFailed { code: String, status: String, error: String },

  #[error("report {code} not ready after {waited:?}")]
  ReportTimeout { code: String, waited: Duration },

  #[error("spreadsheet error: {0}")]
  Sheet(String),

  #[error("missing field {field} in response from {path}")]
  MissingField { path: String, field: &'static str },
}

impl ClientError {
  /// Whether the failed call may succeed if repeated unchanged.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Transport(_) => true,
      Self::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
      _ => false,
    }
  }

  /// Server-requested delay before the next attempt.
  pub fn retry_after(&self) -> Option<Duration> {
    match self {
      Self::Status { retry_after, .. } => *retry_after,
      _ => None,
    }
  }

  pub fn is_exhausted(&self) -> bool { matches!(self, Self::Exhausted { .. }) }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  fn status(code: u16) -> ClientError {
    ClientError::Status { path: "/x".into(), status: code, body: String::new(), retry_after: None }
  }

  #[test]
  fn retryable_statuses() {
    for code in [429, 500, 502, 503, 504] {
      assert!(status(code).is_retryable(), "{code}");
    }
    for code in [400, 401, 403, 404, 501] {
      assert!(!status(code).is_retryable(), "{code}");
    }
    assert!(ClientError::Transport("reset".into()).is_retryable());
    assert!(!ClientError::Request("bad header".into()).is_retryable());
  }
}
