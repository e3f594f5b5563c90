//! Handler errors and their JSON rendering.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("no report {code} for shop {shop_id}")]
  ReportNotFound { shop_id: i64, code: String },

  #[error("limit must be between 1 and {max}, got {got}")]
  InvalidLimit { got: usize, max: usize },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self { Self::Store(Box::new(e)) }

  pub fn status(&self) -> StatusCode {
    match self {
      Self::ReportNotFound { .. } => StatusCode::NOT_FOUND,
      Self::InvalidLimit { .. } => StatusCode::BAD_REQUEST,
      Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

/// Renders as `{ "error": "<message>" }`.
impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    if let Self::Store(e) = &self {
      tracing::error!(error = %e, "store failure while serving request");
    }
    (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
  }
}
