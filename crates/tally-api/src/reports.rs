//! Handlers for `/shops/{shop_id}/reports` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/shops/{shop_id}/reports` | Report headers, no rows |
//! | `GET`  | `/shops/{shop_id}/reports/{code}` | `{columns, rows}` view; 404 if absent |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use tally_core::{
  report::{Report, ReportView},
  store::ReportStore,
};

use crate::error::ApiError;

/// `GET /shops/{shop_id}/reports`
pub async fn list<S: ReportStore>(
  State(store): State<Arc<S>>,
  Path(shop_id): Path<i64>,
) -> Result<Json<Vec<Report>>, ApiError> {
  let reports = store.list_reports(shop_id).await.map_err(ApiError::store)?;
  Ok(Json(reports))
}

/// `GET /shops/{shop_id}/reports/{code}`
pub async fn view<S: ReportStore>(
  State(store): State<Arc<S>>,
  Path((shop_id, code)): Path<(i64, String)>,
) -> Result<Json<ReportView>, ApiError> {
  let view = store.view(shop_id, &code).await.map_err(ApiError::store)?;
  view.map(Json).ok_or(ApiError::ReportNotFound { shop_id, code })
}
