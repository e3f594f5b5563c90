//! Read-only JSON API over a [`ReportStore`].
//!
//! Serves report headers, the `{columns, rows}` view of one report and the
//! sync log of a shop. Writes happen only through the sync pipeline.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", tally_api::api_router(store.clone()))
//! ```

pub mod error;
pub mod history;
pub mod reports;

use std::sync::Arc;

use axum::{Router, routing::get};
use tally_core::store::ReportStore;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Build the API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: ReportStore + 'static,
{
  Router::new()
    .route("/shops/{shop_id}/reports", get(reports::list::<S>))
    .route("/shops/{shop_id}/reports/{code}", get(reports::view::<S>))
    .route("/shops/{shop_id}/sync-log", get(history::list::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(store)
}
