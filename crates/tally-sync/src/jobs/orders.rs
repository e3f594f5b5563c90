//! Order windows per offer: a daily matrix, rolling period sums and
//! delivered-only sums, for either fulfilment scheme.

use chrono::{Duration, NaiveDate};
use serde_json::Value;
use tally_client::{Transport, records::Posting};
use tally_core::{
  colkey::col_span,
  report::{Column, DataType, ReportMeta, RowPatch, RowUpdates},
  store::ReportStore,
  window::{Event, WindowAggregate, WindowSpec, aggregate},
};

use super::JobOutput;
use crate::{Result, context::RunContext};

/// Row key of the totals row.
pub const TOTALS_ROW: &str = "__row3__";

/// Fulfilment scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
  Fbo,
  Fbs,
}

impl Side {
  pub fn code(self) -> &'static str {
    match self {
      Self::Fbo => "orders_fbo_matrix",
      Self::Fbs => "orders_fbs_matrix",
    }
  }

  pub fn meta(self) -> ReportMeta {
    match self {
      Self::Fbo => ReportMeta::new(self.code(), "Заказы FBO (таблица)", "DS..ET, FY..GG, GO..GQ"),
      Self::Fbs => ReportMeta::new(self.code(), "Заказы FBS (таблица)", "EV..FW, FZ..GH, GR..GT"),
    }
  }

  /// First column of the daily matrix.
  pub fn daily_start(self) -> &'static str {
    match self {
      Self::Fbo => "DS",
      Self::Fbs => "EV",
    }
  }

  /// Period-sum columns, aligned with [`WindowSpec::periods`].
  pub fn period_columns(self) -> &'static [&'static str] {
    match self {
      Self::Fbo => &["FY", "GA", "GC", "GE", "GG"],
      Self::Fbs => &["FZ", "GB", "GD", "GF", "GH"],
    }
  }

  /// Delivered-sum columns, aligned with [`WindowSpec::delivered_periods`].
  pub fn delivered_columns(self) -> &'static [&'static str] {
    match self {
      Self::Fbo => &["GO", "GP", "GQ"],
      Self::Fbs => &["GR", "GS", "GT"],
    }
  }

  pub fn daily_columns(self, days: u32) -> Result<Vec<String>> {
    Ok(col_span(self.daily_start(), days as usize)?)
  }
}

/// Report schema. Daily columns are labelled with their `dd.mm` date.
pub fn columns(side: Side, agg: &WindowAggregate) -> Result<Vec<Column>> {
  let mut out = vec![Column::new("offer_id", "Артикул", 10, DataType::Text)];
  let mut order = 20;
  let daily = side.daily_columns(agg.dates.len() as u32)?;
  for (key, label) in daily.iter().zip(agg.date_labels()) {
    out.push(Column::new(key.as_str(), label, order, DataType::Number));
    order += 10;
  }
  for key in side.period_columns().iter().chain(side.delivered_columns()) {
    out.push(Column::new(*key, *key, order, DataType::Number));
    order += 10;
  }
  Ok(out)
}

/// One event per posting line with an offer id.
pub fn events(postings: &[Posting]) -> Vec<Event> {
  let mut out = Vec::new();
  for p in postings {
    let ts = p.in_process_at.as_deref().unwrap_or("");
    for line in &p.products {
      let offer = line.offer_id.trim();
      if offer.is_empty() {
        continue;
      }
      out.push(Event::new(ts, offer, line.quantity, p.status.as_deref()));
    }
  }
  out
}

/// A row per catalog offer, zeros included, plus the totals row.
pub fn matrix_rows(
  side: Side,
  agg: &WindowAggregate,
  spec: &WindowSpec,
  offers: &[String],
) -> Result<RowUpdates> {
  let daily = side.daily_columns(agg.dates.len() as u32)?;
  let periods: Vec<_> = spec.periods.iter().zip(side.period_columns()).collect();
  let delivered: Vec<_> = spec.delivered_periods.iter().zip(side.delivered_columns()).collect();

  let mut rows = RowUpdates::new();
  let mut totals = vec![0i64; daily.len()];
  for offer in offers {
    let mut patch = RowPatch::new().with("offer_id", offer.as_str()).sorted_by("2");
    for (i, (key, v)) in daily.iter().zip(agg.daily_for(offer)).enumerate() {
      patch.set(key.as_str(), v);
      totals[i] += v;
    }
    for (period, key) in &periods {
      patch.set(**key, agg.period_sum(**period, offer));
    }
    for (period, key) in &delivered {
      patch.set(**key, agg.delivered_sum(**period, offer));
    }
    rows.insert(offer.clone(), patch);
  }

  let mut meta = RowPatch::new().with("offer_id", "Итого/периоды").sorted_by("0");
  for (key, v) in daily.iter().zip(totals) {
    meta.set(key.as_str(), v);
  }
  for (period, key) in &delivered {
    meta.set(**key, period_start_label(agg.anchor, **period));
  }
  rows.insert(TOTALS_ROW.to_owned(), meta);
  Ok(rows)
}

/// `dd.mm.yy` of the first day of a `period`-day window ending at `anchor`.
pub fn period_start_label(anchor: NaiveDate, period: u32) -> Value {
  let start = anchor - Duration::days(i64::from(period.max(1)) - 1);
  Value::from(start.format("%d.%m.%y").to_string())
}

pub async fn run<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>, side: Side) -> Result<JobOutput> {
  let s = ctx.settings;
  let batching = s.batching(s.pools.orders);
  let since = ctx.now - Duration::days(s.order_lookback_days);

  let postings = match side {
    Side::Fbo => ctx.client.fbo_postings(since, ctx.now, None, &batching).await?,
    Side::Fbs => ctx.client.fbs_postings(since, ctx.now, None, &batching).await?,
  };
  let agg = aggregate(&events(&postings), ctx.anchor(), ctx.offset(), &s.window);
  let offers = ctx.catalog().await?.offer_ids();

  let rows = matrix_rows(side, &agg, &s.window, &offers)?;
  let mut out = JobOutput::written(ctx.write(side.meta(), &columns(side, &agg)?, rows).await?);
  if agg.dropped > 0 {
    out.warn(format!("{} order lines had an unreadable timestamp", agg.dropped));
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use chrono::FixedOffset;
  use serde_json::json;

  use super::*;

  fn msk() -> FixedOffset { FixedOffset::east_opt(3 * 3600).unwrap() }

  fn anchor() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 5, 20).unwrap() }

  fn postings() -> Vec<Posting> {
    serde_json::from_value(json!([
      {
        "posting_number": "1",
        "status": "delivered",
        "in_process_at": "2024-05-20T09:00:00Z",
        "products": [
          { "offer_id": "OF-1", "quantity": 2 },
          { "offer_id": "", "quantity": 9 },
        ],
      },
      {
        "posting_number": "2",
        "status": "cancelled",
        "in_process_at": "2024-05-10T09:00:00Z",
        "products": [{ "offer_id": "OF-1", "quantity": 5 }, { "offer_id": "STRAY", "quantity": 1 }],
      },
      { "posting_number": "3", "products": [{ "offer_id": "OF-2", "quantity": 1 }] },
    ]))
    .unwrap()
  }

  #[test]
  fn postings_become_line_events() {
    let ev = events(&postings());
    assert_eq!(ev.len(), 4);
    assert_eq!(ev[0].entity_key, "OF-1");
    assert_eq!(ev[0].status.as_deref(), Some("delivered"));
    assert_eq!(ev[3].timestamp, "");
  }

  #[test]
  fn matrix_covers_every_offer() {
    let spec = WindowSpec::default();
    let agg = aggregate(&events(&postings()), anchor(), msk(), &spec);
    let offers = vec!["OF-1".to_string(), "OF-3".to_string()];
    let rows = matrix_rows(Side::Fbo, &agg, &spec, &offers).unwrap();

    assert_eq!(rows.len(), 3);
    let of1 = &rows["OF-1"].data;
    assert_eq!(of1["ET"], json!(2));
    assert_eq!(of1["FY"], json!(2));
    assert_eq!(of1["GA"], json!(7));
    assert_eq!(of1["GO"], json!(2));
    assert_eq!(rows["OF-1"].sort_key.as_deref(), Some("2"));

    let of3 = &rows["OF-3"].data;
    assert_eq!(of3["DS"], json!(0));
    assert_eq!(of3["GG"], json!(0));

    let totals = &rows[TOTALS_ROW];
    assert_eq!(totals.data["offer_id"], json!("Итого/периоды"));
    assert_eq!(totals.data["ET"], json!(2));
    assert_eq!(totals.data["GO"], json!("21.04.24"));
    assert_eq!(totals.data["GQ"], json!("21.02.24"));
    assert!(!totals.data.contains_key("FY"));
    assert_eq!(totals.sort_key.as_deref(), Some("0"));
  }

  #[test]
  fn fbs_uses_its_own_columns() {
    let spec = WindowSpec::default();
    let agg = aggregate(&events(&postings()), anchor(), msk(), &spec);
    let rows = matrix_rows(Side::Fbs, &agg, &spec, &["OF-1".to_string()]).unwrap();
    let of1 = &rows["OF-1"].data;
    assert_eq!(of1["FW"], json!(2));
    assert_eq!(of1["GB"], json!(7));
    assert_eq!(of1["GR"], json!(2));
    assert!(!of1.contains_key("DS"));

    let cols = columns(Side::Fbs, &agg).unwrap();
    assert_eq!(cols.len(), 1 + 28 + 5 + 3);
    assert_eq!(cols[28].key, "FW");
    assert_eq!(cols[28].label, "20.05");
  }
}
