//! The `ReportStore` trait.
//!
//! Implemented by storage backends (e.g. `tally-store-sqlite`). The sync
//! pipeline and the read API depend on this abstraction, not on any concrete
//! backend.

use std::{collections::HashMap, future::Future};

use crate::{
  history::SyncLogEntry,
  report::{Column, EnsureOutcome, Report, ReportMeta, ReportView, Row, RowUpdates, UpsertOutcome},
};

/// Abstraction over a report store backend.
///
/// Schema changes are additive and rows are never deleted. There is no
/// per-row concurrency control; callers order writes to the same row key.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes.
pub trait ReportStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Reports ───────────────────────────────────────────────────────────

  /// Fetch the report for `(shop_id, meta.code)`, creating it if absent.
  /// Title and description are updated when they differ from `meta`.
  fn get_or_create_report(
    &self,
    shop_id: i64,
    meta: ReportMeta,
  ) -> impl Future<Output = Result<Report, Self::Error>> + Send + '_;

  fn find_report<'a>(
    &'a self,
    shop_id: i64,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<Report>, Self::Error>> + Send + 'a;

  fn list_reports(
    &self,
    shop_id: i64,
  ) -> impl Future<Output = Result<Vec<Report>, Self::Error>> + Send + '_;

  // ── Columns ───────────────────────────────────────────────────────────

  /// Create absent columns and update label/order/type on existing ones.
  /// Never deletes.
  fn ensure_columns<'a>(
    &'a self,
    report_id: i64,
    defs: &'a [Column],
  ) -> impl Future<Output = Result<EnsureOutcome, Self::Error>> + Send + 'a;

  /// Columns ordered by `(order, insertion)`.
  fn list_columns(
    &self,
    report_id: i64,
  ) -> impl Future<Output = Result<Vec<Column>, Self::Error>> + Send + '_;

  // ── Rows ──────────────────────────────────────────────────────────────

  /// Shallow-merge each patch into its row, creating rows as needed.
  fn upsert_rows(
    &self,
    report_id: i64,
    updates: RowUpdates,
  ) -> impl Future<Output = Result<UpsertOutcome, Self::Error>> + Send + '_;

  /// Rows ordered by `(sort_key, row_key)`.
  fn list_rows(
    &self,
    report_id: i64,
  ) -> impl Future<Output = Result<Vec<Row>, Self::Error>> + Send + '_;

  /// Materialise the `{columns, rows}` view of a report. `None` if the
  /// report does not exist for this shop.
  fn view<'a>(
    &'a self,
    shop_id: i64,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<ReportView>, Self::Error>> + Send + 'a;

  // ── Cluster slots ─────────────────────────────────────────────────────

  /// Current slot bindings for the given slot codes. Unbound codes are
  /// absent from the map.
  fn cluster_slots<'a>(
    &'a self,
    shop_id: i64,
    codes: &'a [String],
  ) -> impl Future<Output = Result<HashMap<String, i64>, Self::Error>> + Send + 'a;

  /// Bind `code` to `cluster_id`, replacing any previous binding.
  fn bind_cluster_slot<'a>(
    &'a self,
    shop_id: i64,
    code: &'a str,
    cluster_id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Sync log ──────────────────────────────────────────────────────────

  fn record_sync(
    &self,
    entry: SyncLogEntry,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Most recent entries first.
  fn sync_history(
    &self,
    shop_id: i64,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<SyncLogEntry>, Self::Error>> + Send + '_;
}
