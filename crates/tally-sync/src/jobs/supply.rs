//! Goods on their way to fulfilment warehouses, by supply-order state.
//!
//! Every catalog SKU gets a row with the total quantity in flight (`BP`) and
//! one text cell per state listing warehouses and their clusters.

use std::collections::HashMap;

use serde_json::Value;
use tally_client::{
  Transport,
  records::{Cluster, SupplyOrder, WarehouseRef},
};
use tally_core::{
  report::{Column, DataType, ReportMeta, RowPatch, RowUpdates},
  store::ReportStore,
};
use tracing::debug;

use super::JobOutput;
use crate::{Result, context::RunContext};

pub const CODE: &str = "supply_statuses_full";
pub const SUMS_ROW: &str = "__column_sums__";

/// Supply-order state and the column listing it.
pub const STATES: [(&str, &str); 6] = [
  ("DATA_FILLING", "BW"),
  ("READY_TO_SUPPLY", "BX"),
  ("ACCEPTED_AT_SUPPLY_WAREHOUSE", "BY"),
  ("IN_TRANSIT", "BZ"),
  ("ACCEPTANCE_AT_STORAGE_WAREHOUSE", "CA"),
  ("REPORTS_CONFIRMATION_AWAITING", "CB"),
];

pub fn meta() -> ReportMeta { ReportMeta::new(CODE, "Статусы поставок (полная)", "BW..CB как в таблице") }

pub fn columns() -> Vec<Column> {
  let mut out = vec![
    Column::new("sku", "SKU", 10, DataType::Text),
    Column::new("BP", "BP всего", 20, DataType::Number),
  ];
  for (i, (_, col)) in STATES.iter().enumerate() {
    out.push(Column::new(*col, *col, 30 + 10 * i as i64, DataType::Text));
  }
  out
}

fn state_column(status: &str) -> Option<&'static str> {
  STATES.iter().find(|(s, _)| *s == status).map(|(_, c)| *c)
}

// ─── Display names ───────────────────────────────────────────────────────────

const SUFFIXES: [&str; 4] = ["_РФЦ", " РФЦ", "-РФЦ", "- РФЦ"];
const REPLACEMENTS: [(&str, &str); 1] = [("РОСТОВ_НА_ДОНУ_2", "Ростов-на-Дону")];
const LOWER_WORDS: [&str; 22] = [
  "и", "в", "во", "на", "к", "ко", "о", "об", "от", "до", "за", "из", "с", "со", "у", "по", "при",
  "для", "над", "под", "без", "про",
];

fn strip_suffix(name: &str) -> &str {
  let name = name.trim();
  SUFFIXES
    .iter()
    .find_map(|suf| name.strip_suffix(suf))
    .map(str::trim)
    .unwrap_or(name)
}

fn cap_word(word: &str, force: bool) -> String {
  let w = word.trim();
  if w.is_empty() || w.chars().all(|c| c.is_numeric()) {
    return w.to_owned();
  }
  let has_cased = w.chars().any(char::is_alphabetic);
  if has_cased && !w.chars().any(char::is_lowercase) && w.chars().count() <= 3 {
    return w.to_owned();
  }
  let lower = w.to_lowercase();
  if !force && LOWER_WORDS.contains(&lower.as_str()) {
    return lower;
  }
  let mut chars = lower.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => lower,
  }
}

/// Title case that keeps prepositions lower and short abbreviations upper.
/// Underscores count as spaces; hyphenated parts are capitalised separately.
pub fn smart_title(text: &str) -> String {
  let spaced = text.replace('_', " ");
  spaced
    .split_whitespace()
    .enumerate()
    .map(|(wi, word)| {
      word
        .split('-')
        .enumerate()
        .map(|(pi, part)| cap_word(part, wi == 0 && pi == 0))
        .collect::<Vec<_>>()
        .join("-")
    })
    .collect::<Vec<_>>()
    .join(" ")
}

/// Human-readable warehouse or cluster name.
pub fn display_name(raw: &str) -> String {
  let name = strip_suffix(raw);
  let upper = name.to_uppercase();
  if let Some((_, to)) = REPLACEMENTS.iter().find(|(from, _)| *from == upper) {
    return (*to).to_owned();
  }
  smart_title(name)
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// Names and cluster membership of warehouses.
#[derive(Debug, Default)]
pub struct Directory {
  warehouses: HashMap<i64, String>,
  clusters:   HashMap<i64, String>,
}

impl Directory {
  pub fn new(warehouses: &[WarehouseRef], clusters: &[Cluster]) -> Self {
    let mut out = Self::default();
    for wh in warehouses {
      if let Some(id) = wh.warehouse_id {
        out.warehouses.insert(id, wh.name.clone());
      }
    }
    for cl in clusters {
      if cl.name.is_empty() {
        continue;
      }
      for wh in cl.all_warehouses() {
        if let Some(id) = wh.warehouse_id {
          out.clusters.insert(id, cl.name.clone());
        }
      }
    }
    out
  }

  /// Warehouse name as the API spells it: the directory entry, then the
  /// name on the order, then a placeholder with the id.
  pub fn raw_warehouse_name(&self, order: &SupplyOrder) -> String {
    let Some(id) = order.warehouse_id() else { return String::new() };
    self
      .warehouses
      .get(&id)
      .filter(|n| !n.is_empty())
      .cloned()
      .or_else(|| order.storage_warehouse.as_ref().map(|w| w.name.clone()).filter(|n| !n.is_empty()))
      .unwrap_or_else(|| format!("Склад {id}"))
  }

  fn warehouse_name(&self, order: &SupplyOrder) -> String { display_name(&self.raw_warehouse_name(order)) }

  fn cluster_name(&self, order: &SupplyOrder) -> Option<String> {
    order.warehouse_id().and_then(|id| self.clusters.get(&id)).map(|n| display_name(n))
  }
}

/// A row per catalog SKU plus the column-sums row.
pub fn supply_rows(skus: &[String], orders: &[SupplyOrder], dir: &Directory) -> RowUpdates {
  let mut totals: HashMap<&str, i64> = skus.iter().map(|s| (s.as_str(), 0)).collect();
  let mut cells: HashMap<(&str, &str), String> = HashMap::new();
  let mut sums: HashMap<&str, i64> = STATES.iter().map(|(_, c)| (*c, 0)).collect();

  for order in orders {
    let Some(col) = state_column(&order.status) else { continue };
    for item in &order.items {
      let sku = item.sku.trim();
      let Some(total) = totals.get_mut(sku) else { continue };
      *total += item.quantity;
      *sums.entry(col).or_default() += item.quantity;

      let mut entry = format!("{}: {}", dir.warehouse_name(order), item.quantity);
      if let Some(cluster) = dir.cluster_name(order).filter(|c| !c.is_empty()) {
        entry.push_str(&format!("\n🔹 {cluster}"));
      }
      cells
        .entry((sku, col))
        .and_modify(|cell| {
          cell.push('\n');
          cell.push_str(&entry);
        })
        .or_insert(entry);
    }
  }

  let mut rows = RowUpdates::new();
  for sku in skus {
    let mut patch = RowPatch::new()
      .with("sku", sku.as_str())
      .with("BP", totals.get(sku.as_str()).copied().unwrap_or(0))
      .sorted_by("1");
    for (_, col) in STATES {
      if let Some(cell) = cells.remove(&(sku.as_str(), col)) {
        patch.set(col, cell.trim().to_owned());
      }
    }
    rows.insert(sku.clone(), patch);
  }

  let mut meta = RowPatch::new().with("sku", "Итого").with("BP", "").sorted_by("0");
  for (_, col) in STATES {
    meta.set(col, Value::from(sums.get(col).copied().unwrap_or(0)));
  }
  rows.insert(SUMS_ROW.to_owned(), meta);
  rows
}

/// Supply orders in any of [`STATES`].
pub async fn fetch_orders<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>) -> Result<Vec<SupplyOrder>> {
  let mut batching = ctx.settings.batching(ctx.settings.pools.supply);
  batching.page_size = ctx.settings.supply_page_size;
  let states: Vec<&str> = STATES.iter().map(|(s, _)| *s).collect();
  let ids = ctx.client.supply_order_ids(&states, &batching).await?;
  let orders = ctx.client.supply_orders(&ids, &batching).await?;
  debug!(ids = ids.len(), orders = orders.len(), "supply orders fetched");
  Ok(orders)
}

pub async fn run<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>) -> Result<JobOutput> {
  let skus = ctx.catalog().await?.skus();
  if skus.is_empty() {
    debug!(shop_id = ctx.shop_id, "no catalog SKUs, supply statuses skipped");
    return Ok(JobOutput::default());
  }

  let orders = fetch_orders(ctx).await?;
  let dir = Directory::new(&ctx.client.warehouses().await?, &ctx.client.all_clusters().await?);
  let rows = supply_rows(&skus, &orders, &dir);
  Ok(JobOutput::written(ctx.write(meta(), &columns(), rows).await?))
}
