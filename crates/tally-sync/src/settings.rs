//! Pipeline tuning knobs.
//!
//! Every field has a serde default so a config file only needs to name what
//! it changes.

use std::time::Duration;

use chrono::{FixedOffset, Offset as _, Utc};
use serde::{Deserialize, Serialize};
use tally_client::{RetryPolicy, WorkerPool, endpoints::Batching};
use tally_core::window::WindowSpec;

use crate::{
  SyncError,
  jobs::{orders::Side, prices::EXCLUDED_ACTIONS},
};

/// Width of the daily order matrix in the sheet layout.
pub const MATRIX_DAYS: u32 = 28;

/// Worker pool size per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSizes {
  pub catalog:        usize,
  pub stocks:         usize,
  pub prices:         usize,
  pub returns:        usize,
  pub storage:        usize,
  pub orders:         usize,
  pub supply:         usize,
  pub cluster_stocks: usize,
  pub old_year:       usize,
}

impl Default for PoolSizes {
  fn default() -> Self {
    Self {
      catalog:        4,
      stocks:         4,
      prices:         4,
      returns:        4,
      storage:        4,
      orders:         6,
      supply:         8,
      cluster_stocks: 12,
      old_year:       6,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
  /// Per-request HTTP timeout.
  pub request_timeout_secs:      u64,
  pub retry:                     RetryPolicy,
  /// Ids per call on array-accepting endpoints.
  pub chunk_size:                usize,
  /// `limit` on paged endpoints.
  pub page_size:                 u64,
  /// Supply-order listing is paged with its own, smaller limit.
  pub supply_page_size:          u64,
  /// Returns listing limit.
  pub returns_page_size:         u64,
  /// Safety cap on pages per listing.
  pub max_pages:                 usize,
  pub pools:                     PoolSizes,
  pub report_poll_interval_secs: u64,
  pub report_timeout_secs:       u64,
  /// Offset of the reporting timezone from UTC, in hours.
  pub utc_offset_hours:          i32,
  pub window:                    WindowSpec,
  /// How far back order listings reach.
  pub order_lookback_days:       i64,
  pub returns_days:              i64,
  pub storage_days:              i64,
  /// Dimension values per packed fan-out call.
  pub fanout_pack_size:          usize,
  /// Marketing action titles left out of the price report.
  pub excluded_actions:          Vec<String>,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      request_timeout_secs:      30,
      retry:                     RetryPolicy::default(),
      chunk_size:                1000,
      page_size:                 1000,
      supply_page_size:          100,
      returns_page_size:         500,
      max_pages:                 500,
      pools:                     PoolSizes::default(),
      report_poll_interval_secs: 5,
      report_timeout_secs:       300,
      utc_offset_hours:          3,
      window:                    WindowSpec::default(),
      order_lookback_days:       91,
      returns_days:              30,
      storage_days:              30,
      fanout_pack_size:          10,
      excluded_actions:          EXCLUDED_ACTIONS.iter().map(|s| (*s).to_owned()).collect(),
    }
  }
}

impl SyncSettings {
  pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }

  pub fn report_poll_interval(&self) -> Duration {
    Duration::from_secs(self.report_poll_interval_secs)
  }

  pub fn report_timeout(&self) -> Duration { Duration::from_secs(self.report_timeout_secs) }

  /// The reporting timezone. Out-of-range offsets fall back to UTC.
  pub fn offset(&self) -> FixedOffset {
    FixedOffset::east_opt(self.utc_offset_hours.saturating_mul(3600)).unwrap_or_else(|| Utc.fix())
  }

  /// Reject settings the fixed sheet layout cannot hold.
  pub fn validate(&self) -> Result<(), SyncError> {
    let w = &self.window;
    if w.days != MATRIX_DAYS {
      return Err(SyncError::Config(format!("window.days must be {MATRIX_DAYS}, got {}", w.days)));
    }
    check_periods("window.periods", &w.periods, Side::Fbo.period_columns().len())?;
    check_periods("window.delivered_periods", &w.delivered_periods, Side::Fbo.delivered_columns().len())?;
    if self.chunk_size == 0 || self.page_size == 0 || self.supply_page_size == 0 || self.returns_page_size == 0 {
      return Err(SyncError::Config("chunk and page sizes must be positive".into()));
    }
    Ok(())
  }

  /// Default batching with a pool of `pool` workers.
  pub fn batching(&self, pool: usize) -> Batching {
    Batching {
      chunk_size: self.chunk_size,
      page_size:  self.page_size,
      max_pages:  self.max_pages,
      pool:       WorkerPool::new(pool),
    }
  }
}

fn check_periods(name: &str, periods: &[u32], slots: usize) -> Result<(), SyncError> {
  if periods.len() != slots {
    return Err(SyncError::Config(format!("{name} needs {slots} entries, got {}", periods.len())));
  }
  if periods.iter().any(|p| *p == 0) || periods.windows(2).any(|w| w[0] >= w[1]) {
    return Err(SyncError::Config(format!("{name} must be positive and ascending: {periods:?}")));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_config_keeps_defaults() {
    let s: SyncSettings =
      serde_json::from_str(r#"{ "chunk_size": 500, "pools": { "orders": 2 } }"#).unwrap();
    assert_eq!(s.chunk_size, 500);
    assert_eq!(s.pools.orders, 2);
    assert_eq!(s.pools.cluster_stocks, 12);
    assert_eq!(s.window.days, 28);
    assert_eq!(s.offset().local_minus_utc(), 3 * 3600);
  }

  #[test]
  fn defaults_fit_the_layout() {
    let s = SyncSettings::default();
    s.validate().unwrap();
    assert_eq!(s.excluded_actions.len(), EXCLUDED_ACTIONS.len());
  }

  #[test]
  fn layout_mismatches_are_config_errors() {
    let bad_days: SyncSettings = serde_json::from_str(r#"{ "window": { "days": 30 } }"#).unwrap();
    assert!(matches!(bad_days.validate(), Err(SyncError::Config(m)) if m.contains("window.days")));

    let extra_period: SyncSettings =
      serde_json::from_str(r#"{ "window": { "periods": [7, 14, 28, 60, 90, 180] } }"#).unwrap();
    assert!(matches!(extra_period.validate(), Err(SyncError::Config(m)) if m.contains("window.periods")));

    let unordered: SyncSettings =
      serde_json::from_str(r#"{ "window": { "delivered_periods": [60, 30, 90] } }"#).unwrap();
    assert!(matches!(unordered.validate(), Err(SyncError::Config(_))));

    let longer = SyncSettings {
      window: WindowSpec { periods: vec![7, 14, 28, 60, 400], ..Default::default() },
      ..Default::default()
    };
    longer.validate().unwrap();
  }

  #[test]
  fn absurd_offset_falls_back_to_utc() {
    let s = SyncSettings { utc_offset_hours: 99, ..Default::default() };
    assert_eq!(s.offset().local_minus_utc(), 0);
  }
}
