//! Supply orders as a flat list, and per-SKU quantities by supply state with
//! the warehouses and clusters involved.

use std::collections::BTreeMap;

use serde_json::Value;
use tally_client::{Transport, records::SupplyOrder};
use tally_core::{
  report::{Column, DataType, ReportMeta, RowPatch, RowUpdates},
  store::ReportStore,
};

use super::{
  JobOutput,
  supply::{Directory, STATES, fetch_orders},
};
use crate::{Result, context::RunContext};

pub const LIST_CODE: &str = "supplies_fbo";
pub const STATUS_CODE: &str = "supply_statuses";

pub fn list_meta() -> ReportMeta { ReportMeta::new(LIST_CODE, "Поставки FBO", "Список поставок и статусов") }

pub fn list_columns() -> Vec<Column> {
  vec![
    Column::new("supply_id", "ID поставки", 10, DataType::Number),
    Column::new("status", "Статус", 20, DataType::Text),
    Column::new("created_at", "Создано", 30, DataType::Date),
    Column::new("updated_at", "Обновлено", 40, DataType::Date),
    Column::new("warehouse", "Склад", 50, DataType::Text),
    Column::new("cluster", "Кластер", 60, DataType::Text),
    Column::new("items_count", "Позиций", 70, DataType::Number),
  ]
}

fn text(v: Option<&str>) -> Value { Value::from(v.unwrap_or("")) }

pub fn list_rows(orders: &[SupplyOrder]) -> RowUpdates {
  let mut rows = RowUpdates::new();
  for o in orders {
    let Some(id) = o.id else { continue };
    let warehouse = o.storage_warehouse.as_ref().map(|w| w.name.as_str());
    rows.insert(
      id.to_string(),
      RowPatch::new()
        .with("supply_id", id)
        .with("status", o.status.as_str())
        .with("created_at", text(o.created_at.as_deref()))
        .with("updated_at", text(o.updated_at.as_deref()))
        .with("warehouse", text(warehouse))
        .with("cluster", text(o.cluster_name.as_deref()))
        .with("items_count", o.items.len()),
    );
  }
  rows
}

// ─── By SKU and state ────────────────────────────────────────────────────────

pub fn status_meta() -> ReportMeta { ReportMeta::new(STATUS_CODE, "Движение поставок", "Статусы по SKU") }

fn state_keys(state: &str) -> [String; 3] {
  let s = state.to_lowercase();
  [format!("status_{s}"), format!("warehouses_{s}"), format!("clusters_{s}")]
}

pub fn status_columns() -> Vec<Column> {
  let mut out = vec![
    Column::new("sku", "SKU", 10, DataType::Text),
    Column::new("total", "Всего", 20, DataType::Number),
  ];
  let mut order = 30;
  for (state, _) in STATES {
    let [status, warehouses, clusters] = state_keys(state);
    out.push(Column::new(status, state, order, DataType::Number));
    out.push(Column::new(warehouses, format!("Склады {state}"), order + 10, DataType::Text));
    out.push(Column::new(clusters, format!("Кластеры {state}"), order + 20, DataType::Text));
    order += 30;
  }
  out
}

#[derive(Default)]
struct StateCell {
  qty:        i64,
  warehouses: Vec<String>,
  clusters:   Vec<String>,
}

/// A row per SKU found on any order in a known state. Warehouse lines repeat
/// per item; each cluster is listed once per state.
pub fn status_rows(orders: &[SupplyOrder], dir: &Directory) -> RowUpdates {
  let mut acc: BTreeMap<&str, (i64, BTreeMap<&str, StateCell>)> = BTreeMap::new();
  for order in orders {
    let Some(&(state, _)) = STATES.iter().find(|(s, _)| *s == order.status) else { continue };
    let warehouse = dir.raw_warehouse_name(order);
    let cluster = order.cluster_name.as_deref().map(str::trim).filter(|c| !c.is_empty());
    for item in &order.items {
      let sku = item.sku.trim();
      if sku.is_empty() {
        continue;
      }
      let (total, cells) = acc.entry(sku).or_default();
      *total += item.quantity;
      let cell = cells.entry(state).or_default();
      cell.qty += item.quantity;
      cell.warehouses.push(format!("{warehouse}: {}", item.quantity));
      if let Some(c) = cluster {
        let line = format!("🔹 {c}");
        if !cell.clusters.contains(&line) {
          cell.clusters.push(line);
        }
      }
    }
  }

  acc
    .into_iter()
    .map(|(sku, (total, cells))| {
      let mut patch = RowPatch::new().with("sku", sku).with("total", total);
      for (state, _) in STATES {
        let [status, warehouses, clusters] = state_keys(state);
        let cell = cells.get(state);
        patch.set(status, cell.map_or(0, |c| c.qty));
        patch.set(warehouses, cell.map(|c| c.warehouses.join("\n")).unwrap_or_default());
        patch.set(clusters, cell.map(|c| c.clusters.join("\n")).unwrap_or_default());
      }
      (sku.to_owned(), patch)
    })
    .collect()
}

pub async fn run_list<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>) -> Result<JobOutput> {
  let orders = fetch_orders(ctx).await?;
  Ok(JobOutput::written(ctx.write(list_meta(), &list_columns(), list_rows(&orders)).await?))
}

pub async fn run_statuses<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>) -> Result<JobOutput> {
  let orders = fetch_orders(ctx).await?;
  let dir = Directory::new(&ctx.client.warehouses().await?, &[]);
  let rows = status_rows(&orders, &dir);
  Ok(JobOutput::written(ctx.write(status_meta(), &status_columns(), rows).await?))
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use tally_client::records::WarehouseRef;

  use super::*;

  fn orders() -> Vec<SupplyOrder> {
    serde_json::from_value(json!([
      {
        "id": 1,
        "status": "IN_TRANSIT",
        "created_at": "2024-05-01T10:00:00Z",
        "storage_warehouse_id": 10,
        "cluster_name": "Москва",
        "items": [{ "sku": 1001, "quantity": 5 }, { "sku": "1002", "quantity": 1 }],
      },
      {
        "id": 2,
        "state": "IN_TRANSIT",
        "storage_warehouse": { "warehouse_id": 20, "name": "КАЗАНЬ_РФЦ" },
        "cluster_name": "Москва",
        "items": [{ "sku": "1001", "quantity": 2 }],
      },
      { "id": 3, "status": "COMPLETED", "items": [{ "sku": "1001", "quantity": 100 }] },
      { "status": "DATA_FILLING", "storage_warehouse_id": 30, "items": [{ "sku": "1001", "quantity": 1 }] },
    ]))
    .unwrap()
  }

  fn directory() -> Directory {
    let warehouses: Vec<WarehouseRef> =
      serde_json::from_value(json!([{ "warehouse_id": 10, "name": "ХОРУГВИНО_РФЦ" }])).unwrap();
    Directory::new(&warehouses, &[])
  }

  #[test]
  fn list_has_a_row_per_identified_order() {
    let rows = list_rows(&orders());
    assert_eq!(rows.len(), 3);
    let a = &rows["1"].data;
    assert_eq!(a["items_count"], json!(2));
    assert_eq!(a["cluster"], json!("Москва"));
    assert_eq!(a["warehouse"], json!(""));
    assert_eq!(rows["2"].data["warehouse"], json!("КАЗАНЬ_РФЦ"));
    assert_eq!(rows["3"].data["status"], json!("COMPLETED"));
  }

  #[test]
  fn statuses_sum_quantities_and_list_places() {
    let rows = status_rows(&orders(), &directory());
    assert_eq!(rows.len(), 2);

    let a = &rows["1001"].data;
    assert_eq!(a["total"], json!(8));
    assert_eq!(a["status_in_transit"], json!(7));
    assert_eq!(a["warehouses_in_transit"], json!("ХОРУГВИНО_РФЦ: 5\nКАЗАНЬ_РФЦ: 2"));
    assert_eq!(a["clusters_in_transit"], json!("🔹 Москва"));
    assert_eq!(a["status_data_filling"], json!(1));
    assert_eq!(a["warehouses_data_filling"], json!("Склад 30: 1"));
    assert_eq!(a["clusters_data_filling"], json!(""));
    assert_eq!(a["status_ready_to_supply"], json!(0));

    assert_eq!(rows["1002"].data["total"], json!(1));
  }

  #[test]
  fn status_schema() {
    let cols = status_columns();
    assert_eq!(cols.len(), 2 + 3 * STATES.len());
    assert_eq!(cols[2].key, "status_data_filling");
    assert_eq!(cols[3].label, "Склады DATA_FILLING");
    assert_eq!(cols.last().map(|c| c.order), Some(30 + 30 * 5 + 20));
  }
}
