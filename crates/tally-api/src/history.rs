//! Handler for `GET /shops/{shop_id}/sync-log[?limit=<n>]`.
//!
//! Most recent entries first. `limit` defaults to 50 and must be 1..=1000.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use tally_core::{history::SyncLogEntry, store::ReportStore};

use crate::error::ApiError;

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  pub limit: Option<usize>,
}

pub async fn list<S: ReportStore>(
  State(store): State<Arc<S>>,
  Path(shop_id): Path<i64>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<SyncLogEntry>>, ApiError> {
  let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
  if limit == 0 || limit > MAX_LIMIT {
    return Err(ApiError::InvalidLimit { got: limit, max: MAX_LIMIT });
  }
  let entries = store.sync_history(shop_id, limit).await.map_err(ApiError::store)?;
  Ok(Json(entries))
}
