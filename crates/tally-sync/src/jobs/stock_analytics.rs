//! Per-SKU FBO stock analytics: the current counts, and a daily snapshot of
//! the available quantity that accumulates one row per SKU and day.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tally_client::{Transport, records::AnalyticsStock};
use tally_core::{
  report::{Column, DataType, ReportMeta, RowPatch, RowUpdates},
  store::ReportStore,
};
use tracing::debug;

use super::{
  JobOutput,
  cluster_stocks::{COUNT_FIELDS, counts},
};
use crate::{Result, context::RunContext};

pub const CODE: &str = "stocks_analytics";
pub const DYNAMIC_CODE: &str = "fbo_dynamic";

pub fn meta() -> ReportMeta { ReportMeta::new(CODE, "Остатки FBO (аналитика)", "Аналитика остатков по SKU") }

pub fn columns() -> Vec<Column> {
  let mut out = vec![Column::new("sku", "SKU", 10, DataType::Text)];
  for (i, (key, label)) in COUNT_FIELDS.into_iter().enumerate() {
    out.push(Column::new(key, label, 20 + 10 * i as i64, DataType::Number));
  }
  out
}

/// Counts summed over the items of each SKU.
fn totals(items: &[AnalyticsStock]) -> BTreeMap<&str, [i64; 9]> {
  let mut out: BTreeMap<&str, [i64; 9]> = BTreeMap::new();
  for it in items {
    let sku = it.sku.trim();
    if sku.is_empty() {
      continue;
    }
    for (acc, v) in out.entry(sku).or_default().iter_mut().zip(counts(it)) {
      *acc += v;
    }
  }
  out
}

pub fn analytics_rows(items: &[AnalyticsStock]) -> RowUpdates {
  totals(items)
    .into_iter()
    .map(|(sku, c)| {
      let mut patch = RowPatch::new().with("sku", sku);
      for ((key, _), v) in COUNT_FIELDS.iter().zip(c) {
        patch.set(*key, v);
      }
      (sku.to_owned(), patch)
    })
    .collect()
}

// ─── Daily snapshot ──────────────────────────────────────────────────────────

pub fn dynamic_meta() -> ReportMeta { ReportMeta::new(DYNAMIC_CODE, "Динамика FBO", "Ежедневные остатки FBO") }

pub fn dynamic_columns() -> Vec<Column> {
  vec![
    Column::new("sku", "SKU", 10, DataType::Text),
    Column::new("date", "Дата", 20, DataType::Date),
    Column::new("available", "Доступно", 30, DataType::Number),
  ]
}

/// Rows keyed `sku:date`, so earlier days stay in the report.
pub fn dynamic_rows(items: &[AnalyticsStock], today: NaiveDate) -> RowUpdates {
  let day = today.format("%Y-%m-%d").to_string();
  totals(items)
    .into_iter()
    .map(|(sku, c)| {
      let patch = RowPatch::new()
        .with("sku", sku)
        .with("date", day.as_str())
        .with("available", c[0])
        .sorted_by(day.as_str());
      (format!("{sku}:{day}"), patch)
    })
    .collect()
}

async fn fetch<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>) -> Result<Option<Vec<AnalyticsStock>>> {
  let skus = ctx.catalog().await?.skus();
  if skus.is_empty() {
    debug!(shop_id = ctx.shop_id, "no catalog SKUs, stock analytics skipped");
    return Ok(None);
  }
  let batching = ctx.settings.batching(ctx.settings.pools.stocks);
  Ok(Some(ctx.client.analytics_stocks(&skus, &[], &batching).await?))
}

pub async fn run<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>) -> Result<JobOutput> {
  let Some(items) = fetch(ctx).await? else { return Ok(JobOutput::default()) };
  Ok(JobOutput::written(ctx.write(meta(), &columns(), analytics_rows(&items)).await?))
}

pub async fn run_dynamic<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>) -> Result<JobOutput> {
  let Some(items) = fetch(ctx).await? else { return Ok(JobOutput::default()) };
  let rows = dynamic_rows(&items, ctx.anchor());
  Ok(JobOutput::written(ctx.write(dynamic_meta(), &dynamic_columns(), rows).await?))
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn items() -> Vec<AnalyticsStock> {
    serde_json::from_value(json!([
      { "sku": 1001, "available_stock_count": 4, "transit_stock_count": 2, "valid_stock_count": 4 },
      { "sku": "1001", "available_stock_count": 1, "stock_defect_stock_count": 1 },
      { "sku": "1002", "available_stock_count": 0 },
      { "sku": "", "available_stock_count": 8 },
    ]))
    .unwrap()
  }

  #[test]
  fn counts_are_summed_per_sku() {
    let rows = analytics_rows(&items());
    assert_eq!(rows.len(), 2);
    let a = &rows["1001"].data;
    assert_eq!(a["available"], json!(5));
    assert_eq!(a["transit"], json!(2));
    assert_eq!(a["defect"], json!(1));
    assert_eq!(a["valid"], json!(4));
    assert_eq!(rows["1002"].data["requested"], json!(0));
  }

  #[test]
  fn snapshot_rows_carry_the_day() {
    let today = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();
    let rows = dynamic_rows(&items(), today);
    let a = &rows["1001:2024-05-20"];
    assert_eq!(a.data["available"], json!(5));
    assert_eq!(a.data["date"], json!("2024-05-20"));
    assert_eq!(a.sort_key.as_deref(), Some("2024-05-20"));
    assert!(rows.contains_key("1002:2024-05-20"));
  }

  #[test]
  fn schema() {
    let cols = columns();
    assert_eq!(cols.len(), 10);
    assert_eq!(cols[9].key, "valid");
    assert_eq!(cols[9].order, 100);
  }
}
