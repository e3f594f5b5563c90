//! FBS stock and reserve counts per product.

use tally_client::{Transport, records::ProductStocks};
use tally_core::{
  report::{Column, DataType, ReportMeta, RowPatch, RowUpdates},
  store::ReportStore,
};

use super::JobOutput;
use crate::{Result, context::RunContext};

pub const CODE: &str = "stocks";

pub fn meta() -> ReportMeta { ReportMeta::new(CODE, "Остатки FBS", "Наличие и резервы по товарам") }

pub fn columns() -> Vec<Column> {
  vec![
    Column::new("product_id", "Product ID", 10, DataType::Number),
    Column::new("offer_id", "Артикул", 20, DataType::Text),
    Column::new("BL", "FBS в наличии", 30, DataType::Number),
    Column::new("BM", "Резерв общий", 40, DataType::Number),
    Column::new("BN", "Резерв FBO", 50, DataType::Number),
    Column::new("BO", "Резерв FBS", 60, DataType::Number),
  ]
}

/// Present and reserved counts folded over a product's stock entries.
pub fn stock_patch(item: &ProductStocks) -> RowPatch {
  let (mut fbs_present, mut reserved, mut fbo_reserved, mut fbs_reserved) = (0, 0, 0, 0);
  for s in &item.stocks {
    match s.kind.as_str() {
      "fbs" => {
        fbs_present += s.present;
        fbs_reserved += s.reserved;
      }
      "fbo" => fbo_reserved += s.reserved,
      _ => {}
    }
    reserved += s.reserved;
  }
  RowPatch::new()
    .with("product_id", item.product_id)
    .with("offer_id", item.offer_id.as_str())
    .with("BL", fbs_present)
    .with("BM", reserved)
    .with("BN", fbo_reserved)
    .with("BO", fbs_reserved)
}

pub async fn run<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>) -> Result<JobOutput> {
  let catalog = ctx.catalog().await?;
  let ids = catalog.product_ids();
  let items = ctx.client.product_stocks(&ids, &ctx.settings.batching(ctx.settings.pools.stocks)).await?;

  let mut rows = RowUpdates::new();
  for item in &items {
    if let Some(pid) = item.product_id {
      rows.insert(pid.to_string(), stock_patch(item));
    }
  }
  Ok(JobOutput::written(ctx.write(meta(), &columns(), rows).await?))
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn reserves_are_split_by_scheme() {
    let item: ProductStocks = serde_json::from_value(json!({
      "product_id": 101,
      "offer_id": "OF-1",
      "stocks": [
        { "type": "fbs", "present": 5, "reserved": 1 },
        { "type": "fbs", "present": 2, "reserved": 0 },
        { "type": "fbo", "present": 40, "reserved": 3 },
        { "type": "crossborder", "present": 9, "reserved": 2 },
      ],
    }))
    .unwrap();
    let p = stock_patch(&item);
    assert_eq!(p.data["BL"], json!(7));
    assert_eq!(p.data["BM"], json!(6));
    assert_eq!(p.data["BN"], json!(3));
    assert_eq!(p.data["BO"], json!(1));
    assert_eq!(p.data["product_id"], json!(101));
  }
}
