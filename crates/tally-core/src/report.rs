//! Report, column and row types of the wide, sparse table model.
//!
//! A report is a tenant-scoped named table. Its schema (columns) only ever
//! grows; its rows carry a sparse JSON map keyed by column key. A key missing
//! from a row means "not produced yet", which is distinct from zero or empty.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Sparse cell map of a row, keyed by column key.
pub type RowData = serde_json::Map<String, Value>;

/// A batch of partial row updates keyed by row key.
pub type RowUpdates = BTreeMap<String, RowPatch>;

// ─── Report ──────────────────────────────────────────────────────────────────

/// Identity of a report as declared by the job that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMeta {
  pub code:        String,
  pub title:       String,
  pub description: String,
}

impl ReportMeta {
  pub fn new(
    code: impl Into<String>,
    title: impl Into<String>,
    description: impl Into<String>,
  ) -> Self {
    Self {
      code:        code.into(),
      title:       title.into(),
      description: description.into(),
    }
  }
}

/// A persisted report. Unique per `(shop_id, code)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
  pub report_id:   i64,
  pub shop_id:     i64,
  pub code:        String,
  pub title:       String,
  pub description: String,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

// ─── Columns ─────────────────────────────────────────────────────────────────

/// How the display layer should interpret a column's values.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DataType {
  #[default]
  Text,
  Number,
  Date,
}

/// A column definition. Unique per `(report, key)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
  pub key:       String,
  pub label:     String,
  pub order:     i64,
  pub data_type: DataType,
}

impl Column {
  pub fn new(
    key: impl Into<String>,
    label: impl Into<String>,
    order: i64,
    data_type: DataType,
  ) -> Self {
    Self { key: key.into(), label: label.into(), order, data_type }
  }

  /// True when `other` describes the same key with identical fields.
  pub fn same_as(&self, other: &Column) -> bool { self == other }
}

/// Counts returned by [`ReportStore::ensure_columns`](crate::store::ReportStore::ensure_columns).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnsureOutcome {
  pub created:   usize,
  pub updated:   usize,
  pub unchanged: usize,
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// A persisted row. Unique per `(report, row_key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
  pub row_key:    String,
  pub sort_key:   String,
  pub data:       RowData,
  pub updated_at: DateTime<Utc>,
}

impl Row {
  pub fn get(&self, key: &str) -> Option<&Value> { self.data.get(key) }
}

/// A partial update for one row.
///
/// `data` is shallow-merged into the row; `sort_key` replaces the row's sort
/// key only when present and non-empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowPatch {
  pub data:     RowData,
  pub sort_key: Option<String>,
}

impl RowPatch {
  pub fn new() -> Self { Self::default() }

  /// Builder-style setter for one cell.
  pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.data.insert(key.into(), value.into());
    self
  }

  pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
    self.data.insert(key.into(), value.into());
  }

  pub fn sorted_by(mut self, sort_key: impl Into<String>) -> Self {
    self.sort_key = Some(sort_key.into());
    self
  }

  pub fn is_empty(&self) -> bool { self.data.is_empty() && self.sort_key.is_none() }

  /// Fold `other` into this patch; keys in `other` win.
  pub fn absorb(&mut self, other: RowPatch) {
    self.data.extend(other.data);
    if other.sort_key.is_some() {
      self.sort_key = other.sort_key;
    }
  }
}

impl From<RowData> for RowPatch {
  fn from(data: RowData) -> Self { Self { data, sort_key: None } }
}

/// Apply `patch` to an existing row's cells and sort key.
///
/// Shallow map union: keys absent from the patch are preserved, keys present
/// overwrite. Applying the same patch twice is the same as applying it once.
pub fn apply_patch(data: &mut RowData, sort_key: &mut String, patch: &RowPatch) {
  for (k, v) in &patch.data {
    data.insert(k.clone(), v.clone());
  }
  if let Some(sk) = patch.sort_key.as_deref()
    && !sk.is_empty()
  {
    *sort_key = sk.to_owned();
  }
}

/// Counts returned by [`ReportStore::upsert_rows`](crate::store::ReportStore::upsert_rows).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
  pub created: usize,
  pub updated: usize,
}

impl UpsertOutcome {
  pub fn total(&self) -> usize { self.created + self.updated }
}

// ─── Read model ──────────────────────────────────────────────────────────────

/// The read-only view handed to the display layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportView {
  pub code:    String,
  pub title:   String,
  /// Ordered by `(order, insertion)`.
  pub columns: Vec<Column>,
  /// Ordered by `(sort_key, row_key)`.
  pub rows:    Vec<Row>,
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn data(v: Value) -> RowData {
    match v {
      Value::Object(m) => m,
      _ => panic!("expected object"),
    }
  }

  #[test]
  fn patch_preserves_absent_keys() {
    let mut cells = data(json!({ "col1": 1 }));
    let mut sort = String::new();
    apply_patch(&mut cells, &mut sort, &RowPatch::new().with("col2", 2));
    assert_eq!(Value::Object(cells), json!({ "col1": 1, "col2": 2 }));
  }

  #[test]
  fn patch_is_idempotent() {
    let patch = RowPatch::new().with("a", "x").with("b", 3).sorted_by("k");
    let mut once = RowData::new();
    let mut once_sort = String::new();
    apply_patch(&mut once, &mut once_sort, &patch);

    let mut twice = once.clone();
    let mut twice_sort = once_sort.clone();
    apply_patch(&mut twice, &mut twice_sort, &patch);

    assert_eq!(once, twice);
    assert_eq!(once_sort, twice_sort);
  }

  #[test]
  fn empty_sort_key_does_not_clobber() {
    let mut cells = RowData::new();
    let mut sort = "keep".to_string();
    apply_patch(&mut cells, &mut sort, &RowPatch::new().sorted_by(""));
    assert_eq!(sort, "keep");
  }

  #[test]
  fn data_type_round_trips_through_strum() {
    assert_eq!(DataType::Number.to_string(), "number");
    assert_eq!("date".parse::<DataType>().unwrap(), DataType::Date);
    assert!("blob".parse::<DataType>().is_err());
  }

  #[test]
  fn absorb_overwrites_per_key() {
    let mut a = RowPatch::new().with("x", 1).with("y", 1);
    a.absorb(RowPatch::new().with("y", 2).sorted_by("s"));
    assert_eq!(a.data.get("x"), Some(&json!(1)));
    assert_eq!(a.data.get("y"), Some(&json!(2)));
    assert_eq!(a.sort_key.as_deref(), Some("s"));
  }
}
