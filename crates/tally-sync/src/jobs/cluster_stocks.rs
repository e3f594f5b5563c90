//! FBO stock analytics per SKU, overall and per logistics cluster.
//!
//! Cluster columns are bound to clusters through the persisted slot table, so
//! a column keeps showing the same cluster across runs.

use std::collections::HashMap;

use serde_json::Value;
use tally_client::{Transport, records::AnalyticsStock};
use tally_core::{
  colkey::{col_order, col_range},
  report::{Column, DataType, ReportMeta, RowPatch, RowUpdates},
  store::ReportStore,
};
use tracing::debug;

use super::{JobOutput, nonzero, round2};
use crate::{
  Result, SyncError,
  context::RunContext,
  fanout::{assign_slots, fan_out},
};

pub const CODE: &str = "stocks_analytics_full";

pub fn meta() -> ReportMeta { ReportMeta::new(CODE, "Остатки FBO (полная)", "Полная таблица AC..DI") }

/// Available stock per cluster, one column per slot.
pub fn cluster_slots() -> tally_core::Result<Vec<String>> { col_range("AM", "BF") }

/// Single-cluster blocks: slot code and its ads, days-without-sales, idc and
/// grade columns.
pub const BLOCKS: [(&str, [&str; 4]); 7] = [
  ("CK2", ["CH", "CI", "CJ", "CK"]),
  ("CO2", ["CL", "CM", "CN", "CO"]),
  ("CS2", ["CP", "CQ", "CR", "CS"]),
  ("CW2", ["CT", "CU", "CV", "CW"]),
  ("DA2", ["CX", "CY", "CZ", "DA"]),
  ("DE2", ["DB", "DC", "DD", "DE"]),
  ("DI2", ["DF", "DG", "DH", "DI"]),
];

/// Overall counts, in column order from `AC`.
const COUNTS: [&str; 9] = ["AC", "AD", "AE", "AF", "AG", "AH", "AI", "AJ", "AK"];

/// Keys and labels of the nine stock counts, in [`counts`] order.
pub const COUNT_FIELDS: [(&str, &str); 9] = [
  ("available", "Доступно"),
  ("other", "Прочее"),
  ("requested", "Запрошено"),
  ("return_from_customer", "Возврат от клиента"),
  ("return_to_seller", "Возврат продавцу"),
  ("defect", "Брак"),
  ("transit_defect", "Брак в пути"),
  ("transit", "В пути"),
  ("valid", "Годные"),
];

/// The nine stock counts of an analytics item.
pub fn counts(it: &AnalyticsStock) -> [i64; 9] {
  [
    it.available_stock_count,
    it.other_stock_count,
    it.requested_stock_count,
    it.return_from_customer_stock_count,
    it.return_to_seller_stock_count,
    it.stock_defect_stock_count,
    it.transit_defect_stock_count,
    it.transit_stock_count,
    it.valid_stock_count,
  ]
}

const TURNOVER_GRADES: [(&str, &str); 14] = [
  ("TURNOVER_GRADE_NONE", "нет статуса ликвидности."),
  ("DEFICIT", "Хватит до 28 дней"),
  ("POPULAR", "Хватит на 28–56 дней"),
  ("ACTUAL", "Хватит на 56–120 дней"),
  ("SURPLUS", "Продаётся медленно, хватит > 120 дней"),
  ("NO_SALES", "Без продаж последние 28 дней"),
  ("WAS_NO_SALES", "Без продаж и остатков последние 28 дней"),
  ("RESTRICTED_NO_SALES", "Запрет FBO"),
  ("COLLECTING_DATA", "Сбор данных"),
  ("WAITING_FOR_SUPPLY", "Сделайте поставку для сбора данных"),
  ("WAS_DEFICIT", "Был дефицитным последние 56 дней"),
  ("WAS_POPULAR", "Был очень популярным последние 56 дней"),
  ("WAS_ACTUAL", "Был популярным последние 56 дней"),
  ("WAS_SURPLUS", "Был избыточным последние 56 дней"),
];

/// Display text of a turnover grade. Unknown grades pass through.
pub fn turnover_label(grade: Option<&str>) -> String {
  match grade {
    None | Some("") => String::new(),
    Some(g) => TURNOVER_GRADES
      .iter()
      .find(|(k, _)| *k == g)
      .map(|(_, v)| (*v).to_owned())
      .unwrap_or_else(|| g.to_owned()),
  }
}

pub fn columns() -> tally_core::Result<Vec<Column>> {
  let mut out = vec![Column::new("sku", "SKU", 0, DataType::Text)];
  let numbers = COUNTS.map(String::from).into_iter().chain(cluster_slots()?);
  for key in numbers {
    out.push(Column::new(key.clone(), key.clone(), col_order(&key)?, DataType::Number));
  }
  for key in ["CD", "CE", "CF"] {
    out.push(Column::new(key, key, col_order(key)?, DataType::Number));
  }
  out.push(Column::new("CG", "CG", col_order("CG")?, DataType::Text));
  for (_, cols) in BLOCKS {
    for (i, key) in cols.into_iter().enumerate() {
      let data_type = if i == 3 { DataType::Text } else { DataType::Number };
      out.push(Column::new(key, key, col_order(key)?, data_type));
    }
  }
  Ok(out)
}

fn metric(x: Option<f64>) -> Value { x.and_then(round2).unwrap_or_else(|| Value::from("")) }

/// Ads, days without sales, idc and grade cells of one analytics item.
pub(crate) fn metrics(it: &AnalyticsStock) -> [Value; 4] {
  [
    metric(it.ads),
    it.days_without_sales.map(Value::from).unwrap_or_else(|| Value::from("")),
    metric(it.idc),
    Value::from(turnover_label(it.turnover_grade.as_deref())),
  ]
}

/// Everything fetched for one run.
#[derive(Debug, Default)]
pub struct Fetched {
  pub overall:  Vec<AnalyticsStock>,
  /// Items per cluster id.
  pub clusters: HashMap<i64, Vec<AnalyticsStock>>,
  /// Slot code to cluster id, for [`cluster_slots`] and [`BLOCKS`] codes.
  pub slots:    HashMap<String, i64>,
}

impl Fetched {
  fn cluster_items(&self, slot: &str) -> &[AnalyticsStock] {
    self
      .slots
      .get(slot)
      .and_then(|id| self.clusters.get(id))
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }
}

/// One row per catalog SKU.
///
/// Overall counts are summed over the items of a SKU; the per-SKU metrics
/// come from its last item.
pub fn analytics_rows(skus: &[String], fetched: &Fetched) -> tally_core::Result<RowUpdates> {
  let mut rows: RowUpdates =
    skus.iter().map(|s| (s.clone(), RowPatch::new().with("sku", s.as_str()))).collect();

  let mut totals: HashMap<&str, [i64; 9]> = HashMap::new();
  let mut overall_metrics: HashMap<&str, [Value; 4]> = HashMap::new();
  for it in &fetched.overall {
    let sku = it.sku.trim();
    if !rows.contains_key(sku) {
      continue;
    }
    let c = totals.entry(sku).or_default();
    for (acc, v) in c.iter_mut().zip(counts(it)) {
      *acc += v;
    }
    overall_metrics.insert(sku, metrics(it));
  }

  let slot_cols = cluster_slots()?;
  let mut available: HashMap<(&str, &str), i64> = HashMap::new();
  for col in &slot_cols {
    for it in fetched.cluster_items(col) {
      *available.entry((col.as_str(), it.sku.trim())).or_default() += it.available_stock_count;
    }
  }
  let mut block_metrics: HashMap<(&str, &str), [Value; 4]> = HashMap::new();
  for (code, _) in BLOCKS {
    for it in fetched.cluster_items(code) {
      block_metrics.insert((code, it.sku.trim()), metrics(it));
    }
  }

  for (sku, patch) in rows.iter_mut() {
    let sku = sku.as_str();
    if let Some(c) = totals.get(sku) {
      patch.set("AC", c[0]);
      for (key, v) in COUNTS.iter().zip(c).skip(1) {
        patch.set(*key, nonzero(*v));
      }
    }
    if let Some(m) = overall_metrics.get(sku) {
      for (key, v) in ["CD", "CE", "CF", "CG"].into_iter().zip(m) {
        patch.set(key, v.clone());
      }
    }
    for col in &slot_cols {
      patch.set(col.as_str(), nonzero(available.get(&(col.as_str(), sku)).copied().unwrap_or(0)));
    }
    for (code, cols) in BLOCKS {
      match block_metrics.get(&(code, sku)) {
        Some(m) => {
          for (key, v) in cols.into_iter().zip(m) {
            patch.set(key, v.clone());
          }
        }
        None => {
          for key in cols {
            patch.set(key, "");
          }
        }
      }
    }
  }
  Ok(rows)
}

pub async fn run<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>) -> Result<JobOutput> {
  let skus = ctx.catalog().await?.skus();
  if skus.is_empty() {
    debug!(shop_id = ctx.shop_id, "no catalog SKUs, stock analytics skipped");
    return Ok(JobOutput::default());
  }
  let s = ctx.settings;
  let batching = s.batching(s.pools.cluster_stocks);

  let overall = ctx.client.analytics_stocks(&skus, &[], &batching).await?;

  let load = move || async move {
    let clusters = ctx.client.all_clusters().await?;
    Ok::<_, SyncError>(clusters.iter().filter_map(|c| c.id).collect::<Vec<_>>())
  };
  let mut slots: HashMap<String, i64> = HashMap::new();
  slots.extend(assign_slots(ctx.store, ctx.shop_id, &cluster_slots()?, load).await?);
  let block_codes: Vec<String> = BLOCKS.iter().map(|(code, _)| (*code).to_owned()).collect();
  slots.extend(assign_slots(ctx.store, ctx.shop_id, &block_codes, load).await?);

  let dims: Vec<i64> = slots.values().copied().collect();
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
  debug!(
    clusters = fanned.by_dim.len(),
    calls = fanned.calls,
    fallbacks = fanned.fallbacks,
    "cluster stocks fetched"
  );

  let fetched = Fetched { overall, clusters: fanned.by_dim.into_iter().collect(), slots };
  let rows = analytics_rows(&skus, &fetched)?;
  Ok(JobOutput::written(ctx.write(meta(), &columns()?, rows).await?))
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn items(v: Value) -> Vec<AnalyticsStock> { serde_json::from_value(v).unwrap() }

  #[test]
  fn grades_are_translated() {
    assert_eq!(turnover_label(Some("DEFICIT")), "Хватит до 28 дней");
    assert_eq!(turnover_label(Some("SOMETHING_NEW")), "SOMETHING_NEW");
    assert_eq!(turnover_label(None), "");
  }

  #[test]
  fn rows_combine_overall_slots_and_blocks() {
    let fetched = Fetched {
      overall:  items(json!([
        { "sku": 1001, "available_stock_count": 0, "other_stock_count": 3, "ads": 1.005, "days_without_sales": 0, "turnover_grade": "POPULAR" },
        { "sku": "1002", "available_stock_count": 4, "valid_stock_count": 4 },
        { "sku": "1002", "available_stock_count": 1 },
        { "sku": "7777", "available_stock_count": 9 },
      ])),
      clusters: [
        (11, items(json!([{ "sku": "1001", "cluster_id": 11, "available_stock_count": 6 }]))),
        (12, items(json!([{ "sku": "1002", "cluster_id": 12, "available_stock_count": 2, "idc": 12.345, "turnover_grade": "SURPLUS" }]))),
      ]
      .into(),
      slots:    [("AM".to_string(), 11), ("AN".to_string(), 12), ("CK2".to_string(), 12)].into(),
    };
    let rows = analytics_rows(&["1001".into(), "1002".into(), "1003".into()], &fetched).unwrap();
    assert_eq!(rows.len(), 3);

    let a = &rows["1001"].data;
    assert_eq!(a["AC"], json!(0));
    assert_eq!(a["AD"], json!(3));
    assert_eq!(a["AE"], json!(""));
    assert_eq!(a["CD"], json!(1.01));
    assert_eq!(a["CE"], json!(0));
    assert_eq!(a["CF"], json!(""));
    assert_eq!(a["CG"], json!("Хватит на 28–56 дней"));
    assert_eq!(a["AM"], json!(6));
    assert_eq!(a["AN"], json!(""));
    assert_eq!(a["CH"], json!(""));

    let b = &rows["1002"].data;
    assert_eq!(b["AC"], json!(5));
    assert_eq!(b["AK"], json!(4));
    assert_eq!(b["AN"], json!(2));
    assert_eq!(b["CJ"], json!(12.35));
    assert_eq!(b["CK"], json!("Продаётся медленно, хватит > 120 дней"));
    assert_eq!(b["CI"], json!(""));

    let c = &rows["1003"].data;
    assert!(!c.contains_key("AC"));
    assert_eq!(c["BF"], json!(""));
    assert_eq!(c["sku"], json!("1003"));
  }

  #[test]
  fn schema_covers_owned_columns_only() {
    let cols = columns().unwrap();
    assert_eq!(cols.len(), 1 + 9 + 20 + 4 + 28);
    assert!(!cols.iter().any(|c| c.key == "AL" || c.key == "BW"));
    assert!(cols.iter().any(|c| c.key == "DI" && c.data_type == DataType::Text));
  }
}
