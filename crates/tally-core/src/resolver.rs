//! Identifier resolution against the canonical catalog report.
//!
//! Endpoints disagree on which identifier they return (product id, SKU or
//! seller offer id). The resolver indexes the current catalog rows by all
//! three so that any source row can be folded onto its canonical row key.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::report::Row;

/// Which identifier a source row exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKey {
  ProductId,
  Sku,
  OfferId,
}

/// The catalog column keys each identifier is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFields {
  pub product_id: String,
  pub sku:        String,
  pub offer_id:   String,
}

impl Default for KeyFields {
  fn default() -> Self {
    Self { product_id: "L".into(), sku: "K".into(), offer_id: "B".into() }
  }
}

/// Running tally of resolution attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveStats {
  pub resolved:   usize,
  pub unresolved: usize,
}

/// Index from identifier to canonical row key.
#[derive(Debug, Clone, Default)]
pub struct KeyResolver {
  by_product: HashMap<i64, String>,
  by_sku:     HashMap<String, String>,
  by_offer:   HashMap<String, String>,
  stats:      ResolveStats,
}

/// Trimmed string form of an identifier cell. Empty and `null` are `None`.
pub fn normalize_text(value: &Value) -> Option<String> {
  let s = match value {
    Value::String(s) => s.trim().to_owned(),
    Value::Number(n) => n.to_string(),
    _ => return None,
  };
  if s.is_empty() { None } else { Some(s) }
}

/// Integer form of a product id cell. Accepts numbers and numeric strings.
pub fn normalize_id(value: &Value) -> Option<i64> {
  match value {
    Value::Number(n) => n
      .as_i64()
      .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

impl KeyResolver {
  /// Build indices from the catalog report's rows.
  pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a Row>, fields: &KeyFields) -> Self {
    let mut out = Self::default();
    for row in rows {
      if row.row_key.starts_with("__") {
        continue;
      }
      if let Some(pid) = row.get(&fields.product_id).and_then(normalize_id) {
        out.by_product.insert(pid, row.row_key.clone());
      }
      if let Some(sku) = row.get(&fields.sku).and_then(normalize_text) {
        out.by_sku.insert(sku, row.row_key.clone());
      }
      if let Some(offer) = row.get(&fields.offer_id).and_then(normalize_text) {
        out.by_offer.insert(offer, row.row_key.clone());
      }
    }
    out
  }

  /// Look up the canonical row key for `value` under `key`, counting the
  /// attempt.
  pub fn resolve(&mut self, key: JoinKey, value: &Value) -> Option<String> {
    let hit = self.peek(key, value).map(str::to_owned);
    match hit {
      Some(_) => self.stats.resolved += 1,
      None => self.stats.unresolved += 1,
    }
    hit
  }

  /// Lookup without touching the stats.
  pub fn peek(&self, key: JoinKey, value: &Value) -> Option<&str> {
    match key {
      JoinKey::ProductId => normalize_id(value).and_then(|id| self.by_product.get(&id)),
      JoinKey::Sku => normalize_text(value).and_then(|s| self.by_sku.get(&s)),
      JoinKey::OfferId => normalize_text(value).and_then(|s| self.by_offer.get(&s)),
    }
    .map(String::as_str)
  }

  pub fn product_ids(&self) -> Vec<i64> {
    self.by_product.keys().copied().collect::<BTreeSet<_>>().into_iter().collect()
  }

  pub fn skus(&self) -> Vec<String> {
    self.by_sku.keys().cloned().collect::<BTreeSet<_>>().into_iter().collect()
  }

  pub fn offer_ids(&self) -> Vec<String> {
    self.by_offer.keys().cloned().collect::<BTreeSet<_>>().into_iter().collect()
  }

  pub fn is_empty(&self) -> bool {
    self.by_product.is_empty() && self.by_sku.is_empty() && self.by_offer.is_empty()
  }

  pub fn stats(&self) -> ResolveStats { self.stats }

  /// Return the stats accumulated so far and reset them.
  pub fn take_stats(&mut self) -> ResolveStats { std::mem::take(&mut self.stats) }
}
