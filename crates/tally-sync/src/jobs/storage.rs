//! Paid storage from the placement report.
//!
//! The report is generated asynchronously: create, poll, then download a
//! spreadsheet with one row per SKU, warehouse and day.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Duration;
use serde_json::Value;
use tally_client::{
  Transport,
  reports::{download_sheet, wait_for_report},
  sheet::Sheet,
};
use tally_core::{
  report::{Column, DataType, ReportMeta, RowPatch, RowUpdates},
  store::ReportStore,
};
use tracing::debug;

use super::JobOutput;
use crate::{Result, SyncError, context::RunContext};

pub const CODE: &str = "storage";

pub fn meta() -> ReportMeta { ReportMeta::new(CODE, "Хранение", "Стоимость хранения за период") }

pub fn columns() -> Vec<Column> {
  vec![
    Column::new("sku", "SKU", 10, DataType::Number),
    Column::new("cost_total", "Стоимость за период", 20, DataType::Number),
    Column::new("qty_paid", "Платные экземпляры", 30, DataType::Number),
    Column::new("forecast_28", "Прогноз 28 дней", 40, DataType::Number),
    Column::new("warehouses_count", "Складов", 50, DataType::Number),
    Column::new("note", "Склады", 60, DataType::Text),
  ]
}

const WAREHOUSE: &str = "Склад";
const SKU: &str = "SKU";
const QTY: &str = "Кол-во экземпляров";
const QTY_PAID: &str = "Кол-во платных экземпляров";
const COST: &str = "Начисленная стоимость размещения";
const UNNAMED: &str = "Без названия";

/// Located header indices.
struct Layout {
  date:      usize,
  warehouse: usize,
  sku:       usize,
  qty:       usize,
  qty_paid:  usize,
  cost:      usize,
}

impl Layout {
  fn locate(sheet: &Sheet) -> Result<Self> {
    let date = sheet
      .column_containing("дата")
      .ok_or_else(|| SyncError::Layout("placement report has no date column".into()))?;
    Ok(Self {
      date,
      warehouse: sheet.require(WAREHOUSE)?,
      sku: sheet.require(SKU)?,
      qty: sheet.require(QTY)?,
      qty_paid: sheet.require(QTY_PAID)?,
      cost: sheet.require(COST)?,
    })
  }
}

fn as_f64(v: &Value) -> Option<f64> {
  match v {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().replace(',', ".").parse().ok(),
    _ => None,
  }
}

fn as_count(v: &Value) -> i64 { as_f64(v).map(|f| f as i64).unwrap_or(0) }

/// One SKU's totals for one day.
#[derive(Default)]
struct Day {
  qty_paid:   i64,
  cost:       f64,
  qty_by_wh:  BTreeMap<String, i64>,
  stocked_wh: BTreeSet<String>,
}

/// Fold placement rows into one row per SKU.
///
/// The cost covers the whole period; paid quantity, forecast and warehouses
/// come from the latest day present for that SKU.
pub fn storage_rows(sheet: &Sheet) -> Result<RowUpdates> {
  let l = Layout::locate(sheet)?;
  let mut cost_total: BTreeMap<i64, f64> = BTreeMap::new();
  let mut days: BTreeMap<i64, BTreeMap<String, Day>> = BTreeMap::new();

  for row in &sheet.rows {
    let date = match Sheet::cell(row, l.date) {
      Value::Null => continue,
      Value::String(s) if s.is_empty() => continue,
      Value::String(s) => s.clone(),
      other => other.to_string(),
    };
    let Some(sku) = as_f64(Sheet::cell(row, l.sku)).map(|f| f as i64) else {
      debug!(row = ?row, "placement row without a usable SKU");
      continue;
    };
    let warehouse = match Sheet::cell(row, l.warehouse) {
      Value::String(s) if !s.trim().is_empty() => s.trim().to_owned(),
      Value::Number(n) => n.to_string(),
      _ => UNNAMED.to_owned(),
    };
    let qty = as_count(Sheet::cell(row, l.qty));
    let cost = as_f64(Sheet::cell(row, l.cost)).unwrap_or(0.0);

    *cost_total.entry(sku).or_default() += cost;
    let day = days.entry(sku).or_default().entry(date).or_default();
    day.qty_paid += as_count(Sheet::cell(row, l.qty_paid));
    day.cost += cost;
    *day.qty_by_wh.entry(warehouse.clone()).or_default() += qty;
    if qty > 0 {
      day.stocked_wh.insert(warehouse);
    }
  }

  let mut rows = RowUpdates::new();
  for (sku, cost) in cost_total {
    let latest = days.get(&sku).and_then(|d| d.values().next_back());
    let (qty_paid, forecast, warehouses, note) = match latest {
      Some(day) => (
        day.qty_paid,
        (day.cost * 28.0).round_ties_even() as i64,
        day.stocked_wh.len(),
        day
          .stocked_wh
          .iter()
          .map(|wh| format!("🔹 {wh} - {} шт", day.qty_by_wh.get(wh).copied().unwrap_or(0)))
          .collect::<Vec<_>>()
          .join("\n"),
      ),
      None => (0, 0, 0, String::new()),
    };
    rows.insert(
      sku.to_string(),
      RowPatch::new()
        .with("sku", sku)
        .with("cost_total", cost.round_ties_even() as i64)
        .with("qty_paid", qty_paid)
        .with("forecast_28", forecast)
        .with("warehouses_count", warehouses)
        .with("note", note),
    );
  }
  Ok(rows)
}

pub async fn run<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>) -> Result<JobOutput> {
  let to = ctx.anchor();
  let from = to - Duration::days(ctx.settings.storage_days);

  let code = ctx.client.create_placement_report(from, to).await?;
  let url = wait_for_report(
    &ctx.client,
    &code,
    ctx.settings.report_poll_interval(),
    ctx.settings.report_timeout(),
  )
  .await?;
  let sheet = download_sheet(&ctx.client, &url).await?;
  debug!(rows = sheet.rows.len(), "placement report downloaded");

  let rows = storage_rows(&sheet)?;
  Ok(JobOutput::written(ctx.write(meta(), &columns(), rows).await?))
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn sheet(rows: Vec<Vec<Value>>) -> Sheet {
    Sheet::new(
      ["Дата начисления", WAREHOUSE, SKU, QTY, QTY_PAID, COST].map(String::from).to_vec(),
      rows,
    )
  }

  #[test]
  fn latest_day_drives_the_snapshot() {
    let s = sheet(vec![
      vec![json!("2024-05-01"), json!("ТВЕРЬ"), json!(1001.0), json!(4), json!(1), json!(10.4)],
      vec![json!("2024-05-02"), json!("ТВЕРЬ"), json!("1001"), json!(3), json!(2), json!(5.0)],
      vec![json!("2024-05-02"), json!(""), json!(1001), json!(2), json!(1), json!(1.5)],
      vec![json!("2024-05-02"), json!("Казань"), json!(1001), json!(0), json!(0), json!(0)],
      vec![Value::Null, json!("ТВЕРЬ"), json!(1001), json!(100), json!(100), json!(100)],
      vec![json!("2024-05-02"), json!("ТВЕРЬ"), json!("n/a"), json!(1), json!(1), json!(1)],
    ]);
    let rows = storage_rows(&s).unwrap();
    assert_eq!(rows.len(), 1);
    let r = &rows["1001"].data;
    assert_eq!(r["sku"], json!(1001));
    // 10.4 + 5.0 + 1.5
    assert_eq!(r["cost_total"], json!(17));
    assert_eq!(r["qty_paid"], json!(3));
    // (5.0 + 1.5) * 28 = 182
    assert_eq!(r["forecast_28"], json!(182));
    assert_eq!(r["warehouses_count"], json!(2));
    assert_eq!(r["note"], json!("🔹 Без названия - 2 шт\n🔹 ТВЕРЬ - 3 шт"));
  }

  #[test]
  fn missing_headers_are_a_layout_error() {
    let s = Sheet::new(vec!["Склад".into(), "SKU".into()], vec![]);
    assert!(matches!(storage_rows(&s), Err(SyncError::Layout(_))));

    let s = Sheet::new(vec!["Дата".into(), "Склад".into()], vec![]);
    assert!(matches!(storage_rows(&s), Err(SyncError::Client(_))));
  }
}
