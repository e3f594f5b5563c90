//! FBO stock analytics per SKU and logistics cluster, one row for each pair.

use std::collections::BTreeMap;

use serde_json::Value;
use tally_client::{Transport, records::AnalyticsStock};
use tally_core::{
  report::{Column, DataType, ReportMeta, RowPatch, RowUpdates},
  store::ReportStore,
};
use tracing::debug;

use super::{
  JobOutput,
  cluster_stocks::{COUNT_FIELDS, counts, metrics},
};
use crate::{Result, SyncError, context::RunContext, fanout::fan_out};

pub const CODE: &str = "stocks_by_cluster";

pub fn meta() -> ReportMeta { ReportMeta::new(CODE, "Остатки по кластерам", "Остатки SKU по каждому кластеру") }

const METRIC_FIELDS: [(&str, &str, DataType); 4] = [
  ("ads", "ADS", DataType::Number),
  ("days_without_sales", "Дней без продаж", DataType::Number),
  ("idc", "IDC", DataType::Number),
  ("turnover_grade", "Ликвидность", DataType::Text),
];

pub fn columns() -> Vec<Column> {
  let mut out = vec![
    Column::new("sku", "SKU", 10, DataType::Text),
    Column::new("cluster_id", "Кластер", 20, DataType::Number),
  ];
  let mut order = 30;
  for (key, label) in COUNT_FIELDS {
    out.push(Column::new(key, label, order, DataType::Number));
    order += 10;
  }
  for (key, label, data_type) in METRIC_FIELDS {
    out.push(Column::new(key, label, order, data_type));
    order += 10;
  }
  out
}

/// Rows keyed `sku:cluster`. Counts are summed over a pair's items; the
/// metrics come from its last item.
pub fn cluster_rows(by_cluster: &BTreeMap<i64, Vec<AnalyticsStock>>) -> RowUpdates {
  let mut acc: BTreeMap<(String, i64), ([i64; 9], [Value; 4])> = BTreeMap::new();
  for (cluster, items) in by_cluster {
    for it in items {
      let sku = it.sku.trim();
      if sku.is_empty() {
        continue;
      }
      let entry = acc.entry((sku.to_owned(), *cluster)).or_default();
      for (a, v) in entry.0.iter_mut().zip(counts(it)) {
        *a += v;
      }
      entry.1 = metrics(it);
    }
  }

  acc
    .into_iter()
    .map(|((sku, cluster), (c, m))| {
      let mut patch = RowPatch::new().with("sku", sku.as_str()).with("cluster_id", cluster);
      for ((key, _), v) in COUNT_FIELDS.iter().zip(c) {
        patch.set(*key, v);
      }
      for ((key, ..), v) in METRIC_FIELDS.iter().zip(m) {
        patch.set(*key, v);
      }
      (format!("{sku}:{cluster}"), patch)
    })
    .collect()
}

pub async fn run<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>) -> Result<JobOutput> {
  let skus = ctx.catalog().await?.skus();
  if skus.is_empty() {
    debug!(shop_id = ctx.shop_id, "no catalog SKUs, per-cluster stocks skipped");
    return Ok(JobOutput::default());
  }
  let s = ctx.settings;
  let batching = s.batching(s.pools.cluster_stocks);
  let dims: Vec<i64> = ctx.client.all_clusters().await?.iter().filter_map(|c| c.id).collect();

  let skus_ref = &skus;
  let batching_ref = &batching;
  let fanned = fan_out(
    &dims,
    s.fanout_pack_size,
    batching.pool,
    move |pack| async move {
      ctx.client.analytics_stocks(skus_ref, &pack, batching_ref).await.map_err(SyncError::from)
    },
    |it: &AnalyticsStock| it.cluster_id,
  )
  .await?;
  debug!(clusters = fanned.by_dim.len(), calls = fanned.calls, "per-cluster stocks fetched");

  let rows = cluster_rows(&fanned.by_dim);
  Ok(JobOutput::written(ctx.write(meta(), &columns(), rows).await?))
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn items(v: Value) -> Vec<AnalyticsStock> { serde_json::from_value(v).unwrap() }

  #[test]
  fn one_row_per_sku_and_cluster() {
    let by_cluster: BTreeMap<i64, Vec<AnalyticsStock>> = [
      (4, items(json!([
        { "sku": "1001", "available_stock_count": 3, "ads": 0.5 },
        { "sku": "1001", "available_stock_count": 2, "ads": 1.234, "turnover_grade": "DEFICIT" },
        { "sku": "1002", "valid_stock_count": 1 },
      ]))),
      (7, items(json!([{ "sku": "1001", "transit_stock_count": 6, "days_without_sales": 3 }]))),
    ]
    .into();

    let rows = cluster_rows(&by_cluster);
    assert_eq!(rows.len(), 3);

    let a = &rows["1001:4"].data;
    assert_eq!(a["cluster_id"], json!(4));
    assert_eq!(a["available"], json!(5));
    assert_eq!(a["ads"], json!(1.23));
    assert_eq!(a["turnover_grade"], json!("Хватит до 28 дней"));

    let b = &rows["1001:7"].data;
    assert_eq!(b["transit"], json!(6));
    assert_eq!(b["days_without_sales"], json!(3));
    assert_eq!(b["idc"], json!(""));
    assert_eq!(rows["1002:4"].data["valid"], json!(1));
  }

  #[test]
  fn schema() {
    let cols = columns();
    assert_eq!(cols.len(), 2 + 9 + 4);
    assert_eq!(cols[14].key, "turnover_grade");
    assert_eq!(cols[14].order, 150);
  }
}
