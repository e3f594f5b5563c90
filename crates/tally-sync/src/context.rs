//! Per-run state threaded through every job.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tally_client::{ApiClient, Credentials, Transport};
use tally_core::{
  report::{Column, ReportMeta, RowUpdates},
  resolver::{KeyFields, KeyResolver},
  store::ReportStore,
  window::anchor_date,
};
use tracing::debug;
use uuid::Uuid;

use crate::{Result, SyncError, layout, settings::SyncSettings};

/// A tenant whose data is synchronised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shop {
  pub shop_id:     i64,
  #[serde(flatten)]
  pub credentials: Credentials,
}

/// Everything a job needs: who, when, and through which client and store.
pub struct RunContext<'a, S, T> {
  pub run_id:   Uuid,
  pub shop_id:  i64,
  pub store:    &'a S,
  pub client:   ApiClient<T>,
  pub settings: &'a SyncSettings,
  /// Wall-clock start of the run. Jobs derive every date from this.
  pub now:      DateTime<Utc>,
}

impl<S, T> RunContext<'_, S, T> {
  pub fn offset(&self) -> FixedOffset { self.settings.offset() }

  /// "Today" in the reporting timezone.
  pub fn anchor(&self) -> NaiveDate { anchor_date(self.now, self.offset()) }
}

impl<'a, S: ReportStore, T: Transport> RunContext<'a, S, T> {
  /// A context for one job: same run, its own call counters.
  pub fn for_job(&self) -> RunContext<'a, S, T> {
    RunContext {
      run_id:   self.run_id,
      shop_id:  self.shop_id,
      store:    self.store,
      client:   self.client.scoped(),
      settings: self.settings,
      now:      self.now,
    }
  }

  /// Index the canonical catalog as it is stored right now.
  pub async fn catalog(&self) -> Result<KeyResolver> {
    let Some(report) = self
      .store
      .find_report(self.shop_id, layout::CATALOG_CODE)
      .await
      .map_err(SyncError::store)?
    else {
      debug!(shop_id = self.shop_id, "no catalog yet");
      return Ok(KeyResolver::default());
    };
    let rows = self.store.list_rows(report.report_id).await.map_err(SyncError::store)?;
    Ok(KeyResolver::from_rows(&rows, &KeyFields::default()))
  }

  /// Create or refresh a report's schema and upsert `rows` in one batch.
  /// Returns the number of rows written.
  pub async fn write(&self, meta: ReportMeta, columns: &[Column], rows: RowUpdates) -> Result<usize> {
    let code = meta.code.clone();
    let report =
      self.store.get_or_create_report(self.shop_id, meta).await.map_err(SyncError::store)?;
    self.store.ensure_columns(report.report_id, columns).await.map_err(SyncError::store)?;
    if rows.is_empty() {
      return Ok(0);
    }
    let outcome =
      self.store.upsert_rows(report.report_id, rows).await.map_err(SyncError::store)?;
    debug!(
      report = %code,
      created = outcome.created,
      updated = outcome.updated,
      "rows written"
    );
    Ok(outcome.total())
  }
}
