//! Folding secondary reports into the canonical `monitor` report.
//!
//! Every source row is resolved to a catalog row through the identifier its
//! report is keyed by, and its columns are copied onto that row. Meta rows
//! (keys starting with `__`) of offer-keyed sources are copied under a
//! prefixed key instead.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use tally_core::{
  colkey::col_range,
  report::{Row, RowData, RowPatch, RowUpdates},
  resolver::{JoinKey, KeyFields, KeyResolver, normalize_text},
  store::ReportStore,
};
use tracing::{debug, info, warn};

use crate::{
  Result, SyncError,
  jobs::{cluster_stocks, old_year, orders, prices, stocks, storage, supply},
  layout::{monitor_columns, monitor_meta},
};

/// Label of a meta row whose source carries no offer id.
const META_LABEL: &str = "Итого/периоды";

/// One report folded into the canonical report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSource {
  pub code:        String,
  pub join:        JoinKey,
  /// Column of the source row holding the identifier.
  pub key_field:   String,
  /// `(source column, canonical column)` pairs.
  pub columns:     Vec<(String, String)>,
  /// Prefix for meta rows. Sources without one drop their meta rows.
  pub meta_prefix: Option<String>,
}

impl MergeSource {
  pub fn new(code: &str, join: JoinKey, key_field: &str) -> Self {
    Self {
      code: code.to_owned(),
      join,
      key_field: key_field.to_owned(),
      columns: Vec::new(),
      meta_prefix: None,
    }
  }

  /// Copy `keys` under their own names.
  pub fn same(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
    self.columns.extend(keys.into_iter().map(|k| {
      let k = k.into();
      (k.clone(), k)
    }));
    self
  }

  pub fn renamed(mut self, pairs: &[(&str, &str)]) -> Self {
    self.columns.extend(pairs.iter().map(|(s, d)| ((*s).to_owned(), (*d).to_owned())));
    self
  }

  pub fn meta_prefix(mut self, prefix: &str) -> Self {
    self.meta_prefix = Some(prefix.to_owned());
    self
  }

  fn project(&self, data: &RowData) -> RowPatch {
    let mut patch = RowPatch::new();
    for (src, dest) in &self.columns {
      if let Some(v) = data.get(src) {
        patch.set(dest.as_str(), v.clone());
      }
    }
    patch
  }
}

/// FBO and FBS period columns summed into a combined column.
pub const COMBINED: [(&str, &str, &str); 8] = [
  ("GI", "FY", "FZ"),
  ("GJ", "GA", "GB"),
  ("GK", "GC", "GD"),
  ("GL", "GE", "GF"),
  ("GM", "GG", "GH"),
  ("GU", "GO", "GR"),
  ("GV", "GP", "GS"),
  ("GW", "GQ", "GT"),
];

/// The ordered set of sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
  pub sources: Vec<MergeSource>,
}

impl MergePlan {
  /// Every job report that feeds the canonical report.
  pub fn canonical() -> Result<Self> {
    let fbo_old = old_year::Side::Fbo;
    let fbs_old = old_year::Side::Fbs;
    let mut fbo_cols = orders::Side::Fbo.daily_columns(28)?;
    fbo_cols.extend(orders::Side::Fbo.period_columns().iter().map(|s| (*s).to_owned()));
    fbo_cols.extend(orders::Side::Fbo.delivered_columns().iter().map(|s| (*s).to_owned()));
    let mut fbs_cols = orders::Side::Fbs.daily_columns(28)?;
    fbs_cols.extend(orders::Side::Fbs.period_columns().iter().map(|s| (*s).to_owned()));
    fbs_cols.extend(orders::Side::Fbs.delivered_columns().iter().map(|s| (*s).to_owned()));

    let analytics: Vec<String> = cluster_stocks::columns()?
      .into_iter()
      .map(|c| c.key)
      .filter(|k| k != "sku")
      .collect();
    let mut supply_cols = vec!["BP"];
    supply_cols.extend(supply::STATES.iter().map(|(_, c)| *c));

    Ok(Self {
      sources: vec![
        MergeSource::new(cluster_stocks::CODE, JoinKey::Sku, "sku").same(analytics),
        MergeSource::new(supply::CODE, JoinKey::Sku, "sku").same(supply_cols),
        MergeSource::new(storage::CODE, JoinKey::Sku, "sku").renamed(&[
          ("cost_total", "DK"),
          ("qty_paid", "DL"),
          ("forecast_28", "DM"),
          ("warehouses_count", "DN"),
        ]),
        MergeSource::new(stocks::CODE, JoinKey::ProductId, "product_id").same(["BL", "BM", "BN", "BO"]),
        MergeSource::new(prices::CODE, JoinKey::ProductId, "product_id").same(col_range("HP", "IM")?),
        MergeSource::new(orders::Side::Fbo.code(), JoinKey::OfferId, "offer_id")
          .same(fbo_cols)
          .meta_prefix("__fbo__"),
        MergeSource::new(orders::Side::Fbs.code(), JoinKey::OfferId, "offer_id")
          .same(fbs_cols)
          .meta_prefix("__fbs__"),
        MergeSource::new(fbo_old.code(), JoinKey::OfferId, "offer_id")
          .same(fbo_old.month_columns())
          .meta_prefix("__fbo_old__"),
        MergeSource::new(fbs_old.code(), JoinKey::OfferId, "offer_id")
          .same(fbs_old.month_columns().into_iter().chain(["HN"]))
          .meta_prefix("__fbs_old__"),
      ],
    })
  }

  /// Reject plans where two sources, or a source and a combined column,
  /// write the same canonical column.
  pub fn validate(&self) -> Result<()> {
    let mut owner: BTreeMap<&str, &str> = BTreeMap::new();
    for (dest, ..) in COMBINED {
      owner.insert(dest, "combined totals");
    }
    for source in &self.sources {
      for (_, dest) in &source.columns {
        if let Some(prev) = owner.insert(dest.as_str(), source.code.as_str()) {
          return Err(SyncError::Plan(format!(
            "column {dest} is written by both {prev} and {}",
            source.code
          )));
        }
      }
    }
    let mut prefixes = HashSet::new();
    for p in self.sources.iter().filter_map(|s| s.meta_prefix.as_deref()) {
      if !prefixes.insert(p) {
        return Err(SyncError::Plan(format!("meta prefix {p} is used twice")));
      }
    }
    Ok(())
  }
}

/// What a merge did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
  /// Canonical rows written, meta rows included.
  pub rows_folded:     usize,
  /// Source rows whose identifier matched no catalog row.
  pub unresolved:      usize,
  pub meta_rows:       usize,
  /// Sources whose report does not exist yet.
  pub missing_sources: Vec<String>,
}

fn as_number(v: Option<&Value>) -> f64 {
  match v {
    Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
    Some(Value::String(s)) => s.trim().replace(',', ".").parse().unwrap_or(0.0),
    _ => 0.0,
  }
}

fn number_value(x: f64) -> Value {
  if x.fract() == 0.0 && x.abs() < 9.0e15 {
    Value::from(x as i64)
  } else {
    serde_json::Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null)
  }
}

/// Fill the combined FBO+FBS columns of every row in `merged` that carries
/// either side, reading missing inputs from the row as stored.
pub fn add_combined(merged: &mut RowUpdates, stored: &BTreeMap<String, RowData>) {
  for (row_key, patch) in merged.iter_mut() {
    if row_key.starts_with("__") {
      continue;
    }
    let empty = RowData::new();
    let base = stored.get(row_key).unwrap_or(&empty);
    let read = |k: &str| patch.data.get(k).or_else(|| base.get(k));
    let mut sums = Vec::new();
    for (dest, fbo, fbs) in COMBINED {
      if read(fbo).is_none() && read(fbs).is_none() {
        continue;
      }
      sums.push((dest, as_number(read(fbo)) + as_number(read(fbs))));
    }
    for (dest, sum) in sums {
      patch.set(dest, number_value(sum));
    }
  }
}

fn meta_patch(source: &MergeSource, row: &Row) -> RowPatch {
  let mut patch = source.project(&row.data);
  if !patch.data.contains_key("B") {
    let label = row.get(&source.key_field).and_then(normalize_text).unwrap_or_else(|| META_LABEL.to_owned());
    patch.set("B", label);
  }
  if !row.sort_key.is_empty() {
    patch.sort_key = Some(row.sort_key.clone());
  }
  patch
}

/// Fold every source of `plan` into the canonical report of `shop_id`.
pub async fn merge<S: ReportStore>(store: &S, shop_id: i64, plan: &MergePlan) -> Result<MergeReport> {
  let canonical = store.get_or_create_report(shop_id, monitor_meta()).await.map_err(SyncError::store)?;
  store
    .ensure_columns(canonical.report_id, &monitor_columns()?)
    .await
    .map_err(SyncError::store)?;

  let catalog_rows = store.list_rows(canonical.report_id).await.map_err(SyncError::store)?;
  let mut resolver = KeyResolver::from_rows(&catalog_rows, &KeyFields::default());
  let stored: BTreeMap<String, RowData> =
    catalog_rows.into_iter().map(|r| (r.row_key, r.data)).collect();

  let mut report = MergeReport::default();
  let mut merged = RowUpdates::new();
  for source in &plan.sources {
    let Some(src) = store.find_report(shop_id, &source.code).await.map_err(SyncError::store)? else {
      debug!(report = %source.code, "merge source not produced yet");
      report.missing_sources.push(source.code.clone());
      continue;
    };
    let rows = store.list_rows(src.report_id).await.map_err(SyncError::store)?;
    let mut folded = 0usize;
    for row in &rows {
      if row.row_key.starts_with("__") {
        if let Some(prefix) = &source.meta_prefix {
          merged.entry(format!("{prefix}{}", row.row_key)).or_default().absorb(meta_patch(source, row));
          report.meta_rows += 1;
        }
        continue;
      }
      let Some(id) = row.get(&source.key_field) else { continue };
      let Some(target) = resolver.resolve(source.join, id) else { continue };
      let patch = source.project(&row.data);
      if !patch.is_empty() {
        merged.entry(target).or_default().absorb(patch);
        folded += 1;
      }
    }
    let stats = resolver.take_stats();
    if stats.unresolved > 0 {
      warn!(report = %source.code, unresolved = stats.unresolved, "source rows without a catalog match");
    }
    report.unresolved += stats.unresolved;
    debug!(report = %source.code, folded, "source folded");
  }

  add_combined(&mut merged, &stored);
  report.rows_folded = merged.len();
  if !merged.is_empty() {
    store.upsert_rows(canonical.report_id, merged).await.map_err(SyncError::store)?;
  }
  info!(
    shop_id,
    rows = report.rows_folded,
    unresolved = report.unresolved,
    missing = report.missing_sources.len(),
    "merge finished"
  );
  Ok(report)
}
