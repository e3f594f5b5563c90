//! Flat posting lists: recent FBO and FBS postings, and a detailed FBS list
//! with destination cluster, price and applied actions.

use chrono::Duration;
use serde_json::Value;
use tally_client::{Transport, records::Posting};
use tally_core::{
  report::{Column, DataType, ReportMeta, RowPatch, RowUpdates},
  store::ReportStore,
};

use super::{JobOutput, orders::Side};
use crate::{Result, context::RunContext};

/// Reach of the plain posting lists.
pub const LIST_DAYS: i64 = 30;
/// Reach of the detailed FBS list.
pub const DETAILED_DAYS: i64 = 5;

pub const FBS_LIST_CODE: &str = "orders_fbs_list";

pub fn code(side: Side) -> &'static str {
  match side {
    Side::Fbo => "orders_fbo",
    Side::Fbs => "orders_fbs",
  }
}

pub fn meta(side: Side) -> ReportMeta {
  match side {
    Side::Fbo => ReportMeta::new(code(side), "Заказы FBO", "Список отправлений FBO"),
    Side::Fbs => ReportMeta::new(code(side), "Заказы FBS", "Список отправлений FBS"),
  }
}

pub fn columns() -> Vec<Column> {
  vec![
    Column::new("posting_number", "Номер отправления", 10, DataType::Text),
    Column::new("order_number", "Номер заказа", 20, DataType::Text),
    Column::new("status", "Статус", 30, DataType::Text),
    Column::new("created_at", "Создан", 40, DataType::Date),
    Column::new("shipment_date", "Дата отгрузки", 50, DataType::Date),
    Column::new("product_name", "Товар", 60, DataType::Text),
    Column::new("sku", "SKU", 70, DataType::Text),
    Column::new("offer_id", "Артикул", 80, DataType::Text),
    Column::new("quantity", "Кол-во", 90, DataType::Number),
    Column::new("price", "Цена", 100, DataType::Number),
  ]
}

fn text(v: Option<&str>) -> Value { Value::from(v.unwrap_or("")) }

/// One row per posting; product cells come from its first line.
pub fn list_rows(postings: &[Posting]) -> RowUpdates {
  let mut rows = RowUpdates::new();
  for p in postings {
    let number = p.posting_number.trim();
    if number.is_empty() {
      continue;
    }
    let mut patch = RowPatch::new()
      .with("posting_number", number)
      .with("order_number", text(p.order_number.as_deref()))
      .with("status", text(p.status.as_deref()))
      .with("created_at", text(p.created_at.as_deref()))
      .with("shipment_date", text(p.shipment_date.as_deref()));
    if let Some(line) = p.products.first() {
      patch.set("product_name", text(line.name.as_deref()));
      patch.set("sku", line.sku.map(|s| s.to_string()).unwrap_or_default());
      patch.set("offer_id", line.offer_id.as_str());
      patch.set("quantity", line.quantity);
      patch.set("price", line.price);
    }
    if let Some(created) = p.created_at.as_deref().filter(|s| !s.is_empty()) {
      patch = patch.sorted_by(created);
    }
    rows.insert(number.to_owned(), patch);
  }
  rows
}

// ─── Detailed FBS list ───────────────────────────────────────────────────────

pub fn fbs_list_meta() -> ReportMeta { ReportMeta::new(FBS_LIST_CODE, "Заказы FBS (список)", "Подробный список FBS") }

pub fn fbs_list_columns() -> Vec<Column> {
  vec![
    Column::new("posting_number", "Номер отправления", 10, DataType::Text),
    Column::new("status", "Статус", 20, DataType::Text),
    Column::new("offer_id", "Артикул", 30, DataType::Text),
    Column::new("quantity", "Количество", 40, DataType::Number),
    Column::new("created_at", "Дата создания", 50, DataType::Date),
    Column::new("shipment_date", "Дата отгрузки", 60, DataType::Date),
    Column::new("product_name", "Наименование", 70, DataType::Text),
    Column::new("cluster_to", "Кластер отправки", 80, DataType::Text),
    Column::new("price", "Цена", 90, DataType::Number),
    Column::new("actions", "Акции", 100, DataType::Text),
  ]
}

/// One row per posting line, keyed `posting:offer`. A posting without lines
/// still gets a row under its bare number.
pub fn fbs_list_rows(postings: &[Posting]) -> RowUpdates {
  let mut rows = RowUpdates::new();
  for p in postings {
    let number = p.posting_number.trim();
    if number.is_empty() {
      continue;
    }
    let fin = p.financial_data.as_ref();
    let fin_line = fin.and_then(|f| f.products.first());
    let base = || {
      let mut patch = RowPatch::new()
        .with("posting_number", number)
        .with("status", text(p.status.as_deref()))
        .with("created_at", text(p.in_process_at.as_deref()))
        .with("shipment_date", text(p.shipment_date.as_deref()))
        .with("cluster_to", text(fin.and_then(|f| f.cluster_to.as_deref())))
        .with("price", fin_line.and_then(|l| l.price))
        .with("actions", fin_line.map(|l| l.actions_text()).unwrap_or_default());
      if let Some(ts) = p.in_process_at.as_deref().filter(|s| !s.is_empty()) {
        patch = patch.sorted_by(ts);
      }
      patch
    };

    if p.products.is_empty() {
      rows.insert(number.to_owned(), base());
      continue;
    }
    for line in &p.products {
      let patch = base()
        .with("offer_id", line.offer_id.as_str())
        .with("quantity", line.quantity)
        .with("product_name", text(line.name.as_deref()));
      rows.insert(format!("{number}:{}", line.offer_id.trim()), patch);
    }
  }
  rows
}

pub async fn run<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>, side: Side) -> Result<JobOutput> {
  let batching = ctx.settings.batching(ctx.settings.pools.orders);
  let since = ctx.now - Duration::days(LIST_DAYS);
  let postings = match side {
    Side::Fbo => ctx.client.fbo_postings(since, ctx.now, None, &batching).await?,
    Side::Fbs => ctx.client.fbs_postings(since, ctx.now, None, &batching).await?,
  };
  Ok(JobOutput::written(ctx.write(meta(side), &columns(), list_rows(&postings)).await?))
}

pub async fn run_fbs_list<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>) -> Result<JobOutput> {
  let batching = ctx.settings.batching(ctx.settings.pools.orders);
  let since = ctx.now - Duration::days(DETAILED_DAYS);
  let postings = ctx.client.fbs_postings_detailed(since, ctx.now, &batching).await?;
  Ok(JobOutput::written(ctx.write(fbs_list_meta(), &fbs_list_columns(), fbs_list_rows(&postings)).await?))
}
