//! Sync jobs.
//!
//! Every job fetches one family of API data and writes it, in a single batch,
//! into its own report keyed by the identifier the API returns. Only
//! [`catalog`] writes the canonical report directly; everything else reaches
//! it through [`merge`](crate::merge).

pub mod catalog;
pub mod cluster_stocks;
pub mod clusters;
pub mod old_year;
pub mod orders;
pub mod orders_agg;
pub mod postings;
pub mod prices;
pub mod returns;
pub mod stock_analytics;
pub mod stocks;
pub mod stocks_by_cluster;
pub mod storage;
pub mod supplies;
pub mod supply;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString};
use tally_client::Transport;
use tally_core::store::ReportStore;

use self::orders::Side;
use crate::{Result, context::RunContext};

/// The jobs of one pipeline run.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
  Catalog,
  OrdersFbo,
  OrdersFbs,
  OrdersFboAgg,
  OrdersFbsAgg,
  OrdersFboMatrix,
  OrdersFbsMatrix,
  OrdersFbsList,
  Clusters,
  Returns,
  Storage,
  Stocks,
  PriceLogistics,
  FboDynamic,
  StocksAnalytics,
  SuppliesFbo,
  SupplyStatuses,
  StocksByCluster,
  StocksAnalyticsFull,
  SupplyStatusesFull,
  FboOldYear,
  FbsOldYear,
}

impl JobKind {
  /// Code of the report the job writes.
  pub fn report_code(self) -> &'static str {
    match self {
      Self::Catalog => crate::layout::CATALOG_CODE,
      Self::OrdersFbo => postings::code(Side::Fbo),
      Self::OrdersFbs => postings::code(Side::Fbs),
      Self::OrdersFboAgg => orders_agg::code(Side::Fbo),
      Self::OrdersFbsAgg => orders_agg::code(Side::Fbs),
      Self::OrdersFboMatrix => Side::Fbo.code(),
      Self::OrdersFbsMatrix => Side::Fbs.code(),
      Self::OrdersFbsList => postings::FBS_LIST_CODE,
      Self::Clusters => clusters::CODE,
      Self::Returns => returns::CODE,
      Self::Storage => storage::CODE,
      Self::Stocks => stocks::CODE,
      Self::PriceLogistics => prices::CODE,
      Self::FboDynamic => stock_analytics::DYNAMIC_CODE,
      Self::StocksAnalytics => stock_analytics::CODE,
      Self::SuppliesFbo => supplies::LIST_CODE,
      Self::SupplyStatuses => supplies::STATUS_CODE,
      Self::StocksByCluster => stocks_by_cluster::CODE,
      Self::StocksAnalyticsFull => cluster_stocks::CODE,
      Self::SupplyStatusesFull => supply::CODE,
      Self::FboOldYear => old_year::Side::Fbo.code(),
      Self::FbsOldYear => old_year::Side::Fbs.code(),
    }
  }

  /// Whether the job reads the canonical catalog and so has to wait for it.
  pub fn needs_catalog(self) -> bool {
    matches!(
      self,
      Self::Stocks
        | Self::PriceLogistics
        | Self::OrdersFboMatrix
        | Self::OrdersFbsMatrix
        | Self::FboDynamic
        | Self::StocksAnalytics
        | Self::StocksByCluster
        | Self::StocksAnalyticsFull
        | Self::SupplyStatusesFull
        | Self::FboOldYear
        | Self::FbsOldYear
    )
  }

  pub async fn run<S: ReportStore, T: Transport>(self, ctx: &RunContext<'_, S, T>) -> Result<JobOutput> {
    match self {
      Self::Catalog => catalog::run(ctx).await,
      Self::OrdersFbo => postings::run(ctx, Side::Fbo).await,
      Self::OrdersFbs => postings::run(ctx, Side::Fbs).await,
      Self::OrdersFboAgg => orders_agg::run(ctx, Side::Fbo).await,
      Self::OrdersFbsAgg => orders_agg::run(ctx, Side::Fbs).await,
      Self::OrdersFboMatrix => orders::run(ctx, Side::Fbo).await,
      Self::OrdersFbsMatrix => orders::run(ctx, Side::Fbs).await,
      Self::OrdersFbsList => postings::run_fbs_list(ctx).await,
      Self::Clusters => clusters::run(ctx).await,
      Self::Returns => returns::run(ctx).await,
      Self::Storage => storage::run(ctx).await,
      Self::Stocks => stocks::run(ctx).await,
      Self::PriceLogistics => prices::run(ctx).await,
      Self::FboDynamic => stock_analytics::run_dynamic(ctx).await,
      Self::StocksAnalytics => stock_analytics::run(ctx).await,
      Self::SuppliesFbo => supplies::run_list(ctx).await,
      Self::SupplyStatuses => supplies::run_statuses(ctx).await,
      Self::StocksByCluster => stocks_by_cluster::run(ctx).await,
      Self::StocksAnalyticsFull => cluster_stocks::run(ctx).await,
      Self::SupplyStatusesFull => supply::run(ctx).await,
      Self::FboOldYear => old_year::run(ctx, old_year::Side::Fbo).await,
      Self::FbsOldYear => old_year::run(ctx, old_year::Side::Fbs).await,
    }
  }
}

/// What a finished job reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutput {
  pub rows_written: usize,
  /// Source items dropped because their identifier matched no catalog row.
  pub unresolved:   usize,
  /// Completeness problems that did not abort the job.
  pub warnings:     Vec<String>,
}

impl JobOutput {
  pub fn written(rows_written: usize) -> Self { Self { rows_written, ..Default::default() } }

  pub fn warn(&mut self, warning: impl Into<String>) { self.warnings.push(warning.into()) }
}

// ─── Value helpers ───────────────────────────────────────────────────────────

/// `x.ceil()` as an integer.
pub(crate) fn ceil(x: f64) -> i64 { x.ceil() as i64 }

/// Round to two decimals, ties away from zero, as seen in the value's
/// shortest decimal form (`1.005` becomes `1.01`).
pub(crate) fn round2(x: f64) -> Option<Value> {
  if !x.is_finite() {
    return None;
  }
  let repr = x.abs().to_string();
  let (int, frac) = repr.split_once('.').unwrap_or((&repr, ""));
  let Ok(int) = int.parse::<i128>() else {
    // Integer part beyond i128.
    let r = (x * 100.0).round() / 100.0;
    return serde_json::Number::from_f64(r).map(Value::Number);
  };
  let digits: Vec<i128> =
    frac.chars().chain("000".chars()).take(3).filter_map(|c| c.to_digit(10)).map(i128::from).collect();
  let mut cents = int * 100 + digits[0] * 10 + digits[1];
  if digits[2] >= 5 {
    cents += 1;
  }
  let sign = if x < 0.0 && cents != 0 { "-" } else { "" };
  let text = format!("{sign}{}.{:02}", cents / 100, cents % 100);
  text.parse::<f64>().ok().and_then(serde_json::Number::from_f64).map(Value::Number)
}

/// `v` when non-zero, `""` otherwise.
pub(crate) fn nonzero(v: i64) -> Value { if v == 0 { Value::from("") } else { Value::from(v) } }

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use serde_json::json;
  use strum::IntoEnumIterator;

  use super::*;

  #[test]
  fn job_names_are_snake_case() {
    assert_eq!(JobKind::PriceLogistics.to_string(), "price_logistics");
    assert_eq!(JobKind::from_str("fbs_old_year").unwrap(), JobKind::FbsOldYear);
    assert_eq!(JobKind::from_str("stocks_analytics_full").unwrap(), JobKind::StocksAnalyticsFull);
    assert_eq!(JobKind::iter().count(), 22);
  }

  #[test]
  fn report_codes_are_distinct() {
    let mut codes: Vec<_> = JobKind::iter().map(JobKind::report_code).collect();
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), 22);
    assert_eq!(JobKind::StocksAnalyticsFull.report_code(), "stocks_analytics_full");
    assert_eq!(JobKind::SupplyStatusesFull.report_code(), "supply_statuses_full");
    assert_eq!(JobKind::StocksAnalytics.report_code(), "stocks_analytics");
  }

  #[test]
  fn job_and_report_names_agree() {
    for kind in JobKind::iter().filter(|k| *k != JobKind::Catalog) {
      let name = kind.to_string();
      let code = kind.report_code();
      assert!(code == name || code == format!("orders_{name}"), "{kind}");
    }
  }

  #[test]
  fn catalog_readers_are_flagged() {
    assert!(!JobKind::Catalog.needs_catalog());
    assert!(JobKind::StocksByCluster.needs_catalog());
    assert!(JobKind::OrdersFboMatrix.needs_catalog());
    assert!(!JobKind::OrdersFboAgg.needs_catalog());
    assert!(!JobKind::Clusters.needs_catalog());
  }

  #[test]
  fn rounds_half_up_on_the_decimal_form() {
    assert_eq!(round2(1.005), Some(json!(1.01)));
    assert_eq!(round2(2.675), Some(json!(2.68)));
    assert_eq!(round2(0.125), Some(json!(0.13)));
    assert_eq!(round2(3.0), Some(json!(3.0)));
    assert_eq!(round2(-1.005), Some(json!(-1.01)));
    assert_eq!(round2(f64::NAN), None);
  }

  #[test]
  fn helpers() {
    assert_eq!(ceil(2.01), 3);
    assert_eq!(ceil(-0.5), 0);
    assert_eq!(nonzero(0), json!(""));
    assert_eq!(nonzero(4), json!(4));
  }
}
