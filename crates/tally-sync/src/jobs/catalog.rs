//! The catalog job: product list plus product info, into `monitor`.

use std::collections::BTreeMap;

use tally_client::{
  Transport,
  records::{ProductInfo, ProductListItem},
};
use tally_core::{
  report::{RowPatch, RowUpdates},
  resolver::{JoinKey, KeyResolver},
  store::ReportStore,
};
use tracing::info;

use super::JobOutput;
use crate::{Result, context::RunContext, layout};

/// Row key of a listed product: its offer id, or its product id when the
/// offer id is blank. Products with neither are skipped.
pub fn row_key(item: &ProductListItem) -> Option<String> {
  let offer = item.offer_id.trim();
  match (offer.is_empty(), item.product_id) {
    (false, _) => Some(offer.to_owned()),
    (true, Some(pid)) => Some(pid.to_string()),
    (true, None) => None,
  }
}

/// Identity cells for every listed product.
pub fn list_rows(items: &[ProductListItem]) -> RowUpdates {
  let mut rows = RowUpdates::new();
  for item in items {
    let Some(key) = row_key(item) else { continue };
    let offer = item.offer_id.trim();
    rows.insert(
      key,
      RowPatch::new().with("B", offer).with("L", item.product_id).sorted_by(offer),
    );
  }
  rows
}

/// Descriptive cells from one product-info record.
pub fn info_patch(info: &ProductInfo) -> RowPatch {
  let is_super = match info.is_super {
    Some(true) => "✔️",
    Some(false) => "❌",
    None => "",
  };
  RowPatch::new()
    .with("K", info.sku)
    .with("C", info.name.clone())
    .with("N", info.created_at.clone())
    .with("O", info.updated_at.clone())
    .with("P", info.vat.clone())
    .with("Y", info.volume_weight)
    .with("D", is_super)
    .with("M", info.first_barcode())
    .with("A", info.primary_image_url())
    .with("JG", info.updated_at.clone())
}

/// Product id → row key, for the listed products and anything already in
/// the stored catalog. Listed products win.
pub fn product_keys(items: &[ProductListItem], stored: &KeyResolver) -> BTreeMap<i64, String> {
  let mut keys: BTreeMap<i64, String> = stored
    .product_ids()
    .into_iter()
    .filter_map(|pid| stored.peek(JoinKey::ProductId, &pid.into()).map(|k| (pid, k.to_owned())))
    .collect();
  for item in items {
    if let (Some(pid), Some(key)) = (item.product_id, row_key(item)) {
      keys.insert(pid, key);
    }
  }
  keys
}

pub async fn run<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>) -> Result<JobOutput> {
  let batching = ctx.settings.batching(ctx.settings.pools.catalog);
  let mut out = JobOutput::default();

  let listing = ctx.client.list_products(&batching).await?;
  if listing.truncated {
    out.warn(format!("product list stopped at the page cap ({} pages)", listing.pages));
  }
  let stored = ctx.catalog().await?;
  let keys = product_keys(&listing.items, &stored);
  let mut rows = list_rows(&listing.items);

  let ids: Vec<i64> = keys.keys().copied().collect();
  let infos = ctx.client.product_info(&ids, &batching).await?;
  for info in &infos {
    match info.id.and_then(|id| keys.get(&id)) {
      Some(key) => rows.entry(key.clone()).or_default().absorb(info_patch(info)),
      None => out.unresolved += 1,
    }
  }
  info!(listed = listing.items.len(), described = infos.len(), "catalog fetched");

  out.rows_written = ctx.write(layout::monitor_meta(), &layout::monitor_columns()?, rows).await?;
  Ok(out)
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use serde_json::{Value, json};
  use tally_core::{report::Row, resolver::KeyFields};

  use super::*;

  fn item(offer: &str, pid: Option<i64>) -> ProductListItem {
    serde_json::from_value(json!({ "offer_id": offer, "product_id": pid })).unwrap()
  }

  #[test]
  fn keys_fall_back_to_product_id() {
    assert_eq!(row_key(&item(" OF-1 ", Some(1))).as_deref(), Some("OF-1"));
    assert_eq!(row_key(&item("", Some(7))).as_deref(), Some("7"));
    assert_eq!(row_key(&item("", None)), None);

    let rows = list_rows(&[item("OF-1", Some(1)), item("", Some(7)), item("", None)]);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows["OF-1"].data["L"], json!(1));
    assert_eq!(rows["OF-1"].sort_key.as_deref(), Some("OF-1"));
    assert_eq!(rows["7"].data["B"], json!(""));
  }

  #[test]
  fn info_cells() {
    let info: ProductInfo = serde_json::from_value(json!({
      "id": 1,
      "offer_id": "OF-1",
      "sku": 9001,
      "name": "Чайник",
      "updated_at": "2024-05-01T10:00:00Z",
      "is_super": false,
      "barcodes": ["460000000001", "460000000002"],
      "primary_image": ["https://img/1.jpg"],
      "volume_weight": 1.5,
    }))
    .unwrap();
    let p = info_patch(&info);
    assert_eq!(p.data["K"], json!(9001));
    assert_eq!(p.data["D"], json!("❌"));
    assert_eq!(p.data["M"], json!("460000000001"));
    assert_eq!(p.data["A"], json!("https://img/1.jpg"));
    assert_eq!(p.data["JG"], p.data["O"]);
    assert_eq!(p.data["N"], Value::Null);
  }

  #[test]
  fn stored_products_keep_their_keys() {
    let Value::Object(data) = json!({ "B": "OLD", "L": 5 }) else { unreachable!() };
    let stored = KeyResolver::from_rows(
      &[Row { row_key: "OLD".into(), sort_key: "OLD".into(), data, updated_at: Utc::now() }],
      &KeyFields::default(),
    );
    let keys = product_keys(&[item("NEW", Some(6))], &stored);
    assert_eq!(keys.get(&5).map(String::as_str), Some("OLD"));
    assert_eq!(keys.get(&6).map(String::as_str), Some("NEW"));
  }
}
