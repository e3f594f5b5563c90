//! Customer returns whose status changed recently. Standalone report.

use chrono::Duration;
use tally_client::{Transport, records::ReturnItem};
use tally_core::{
  report::{Column, DataType, ReportMeta, RowPatch, RowUpdates},
  store::ReportStore,
};

use super::JobOutput;
use crate::{Result, context::RunContext};

pub const CODE: &str = "returns";

pub fn meta() -> ReportMeta { ReportMeta::new(CODE, "Возвраты", "Список возвратов за 30 дней") }

pub fn columns() -> Vec<Column> {
  vec![
    Column::new("return_id", "ID возврата", 10, DataType::Text),
    Column::new("offer_id", "Артикул", 20, DataType::Text),
    Column::new("sku", "SKU", 30, DataType::Text),
    Column::new("quantity", "Кол-во", 40, DataType::Number),
    Column::new("status", "Статус", 50, DataType::Text),
    Column::new("reason", "Причина", 60, DataType::Text),
    Column::new("price", "Цена", 70, DataType::Number),
    Column::new("created_at", "Создан", 80, DataType::Date),
  ]
}

pub fn return_rows(items: &[ReturnItem]) -> RowUpdates {
  let mut rows = RowUpdates::new();
  for it in items {
    let Some(key) = it.key() else { continue };
    rows.insert(
      key.clone(),
      RowPatch::new()
        .with("return_id", key)
        .with("offer_id", it.offer())
        .with("sku", it.sku().map(|s| s.to_string()))
        .with("quantity", it.qty())
        .with("status", it.status.clone())
        .with("reason", it.reason.clone())
        .with("price", it.price)
        .with("created_at", it.created_at.clone()),
    );
  }
  rows
}

pub async fn run<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>) -> Result<JobOutput> {
  let mut batching = ctx.settings.batching(ctx.settings.pools.returns);
  batching.page_size = ctx.settings.returns_page_size;
  let since = ctx.now - Duration::days(ctx.settings.returns_days);

  let listing = ctx.client.returns(since, ctx.now, &batching).await?;
  let rows = return_rows(&listing.items);
  let mut out = JobOutput::written(ctx.write(meta(), &columns(), rows).await?);
  if listing.truncated {
    out.warn(format!("returns stopped at the page cap ({} pages)", listing.pages));
  }
  Ok(out)
}
