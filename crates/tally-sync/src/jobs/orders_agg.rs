//! Ordered quantity per offer over trailing day windows.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tally_client::{Transport, records::Posting};
use tally_core::{
  report::{Column, DataType, ReportMeta, RowPatch, RowUpdates},
  store::ReportStore,
  window::parse_timestamp,
};

use super::{JobOutput, orders::Side};
use crate::{Result, context::RunContext};

pub const PERIODS: [i64; 5] = [7, 14, 28, 60, 90];

pub fn code(side: Side) -> &'static str {
  match side {
    Side::Fbo => "orders_fbo_agg",
    Side::Fbs => "orders_fbs_agg",
  }
}

pub fn meta(side: Side) -> ReportMeta {
  match side {
    Side::Fbo => ReportMeta::new(code(side), "Заказы FBO (агр.)", "Агрегация заказов FBO по офферу"),
    Side::Fbs => ReportMeta::new(code(side), "Заказы FBS (агр.)", "Агрегация заказов FBS по офферу"),
  }
}

fn period_key(days: i64) -> String { format!("orders_{days}") }

pub fn columns() -> Vec<Column> {
  let mut out = vec![Column::new("offer_id", "Артикул", 10, DataType::Text)];
  for (i, days) in PERIODS.into_iter().enumerate() {
    out.push(Column::new(period_key(days), format!("Заказы {days}д"), 20 + 10 * i as i64, DataType::Number));
  }
  out
}

/// Quantities per offer for each of [`PERIODS`], counted back from `now`.
/// A line with zero quantity counts once; a posting without a readable date
/// is skipped.
pub fn agg_rows(postings: &[Posting], now: DateTime<Utc>) -> (RowUpdates, usize) {
  let mut sums: BTreeMap<&str, [i64; PERIODS.len()]> = BTreeMap::new();
  let mut undated = 0;
  for p in postings {
    let Some(at) = p.created().and_then(parse_timestamp) else {
      undated += 1;
      continue;
    };
    for line in &p.products {
      let offer = line.offer_id.trim();
      if offer.is_empty() {
        continue;
      }
      let qty = if line.quantity == 0 { 1 } else { line.quantity };
      let acc = sums.entry(offer).or_default();
      for (slot, days) in acc.iter_mut().zip(PERIODS) {
        if at >= now - Duration::days(days) {
          *slot += qty;
        }
      }
    }
  }

  let rows = sums
    .into_iter()
    .map(|(offer, acc)| {
      let mut patch = RowPatch::new().with("offer_id", offer);
      for (v, days) in acc.into_iter().zip(PERIODS) {
        patch.set(period_key(days), v);
      }
      (offer.to_owned(), patch)
    })
    .collect();
  (rows, undated)
}

pub async fn run<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>, side: Side) -> Result<JobOutput> {
  let batching = ctx.settings.batching(ctx.settings.pools.orders);
  let since = ctx.now - Duration::days(PERIODS[PERIODS.len() - 1]);
  let postings = match side {
    Side::Fbo => ctx.client.fbo_postings(since, ctx.now, None, &batching).await?,
    Side::Fbs => ctx.client.fbs_postings(since, ctx.now, None, &batching).await?,
  };
  let (rows, undated) = agg_rows(&postings, ctx.now);
  let mut out = JobOutput::written(ctx.write(meta(side), &columns(), rows).await?);
  if undated > 0 {
    out.warn(format!("{undated} postings had no readable date"));
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;

  #[test]
  fn quantities_fall_into_every_window_that_covers_them() {
    let now = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
    let postings: Vec<Posting> = serde_json::from_value(json!([
      { "created_at": "2024-05-18T10:00:00Z", "products": [{ "offer_id": "A", "quantity": 2 }] },
      { "in_process_at": "2024-04-30T10:00:00Z", "products": [{ "offer_id": "A", "quantity": 0 }] },
      { "created_at": "2024-03-01T10:00:00Z", "products": [{ "offer_id": "B", "quantity": 4 }, { "offer_id": "", "quantity": 9 }] },
      { "created_at": "garbage", "products": [{ "offer_id": "A", "quantity": 50 }] },
    ]))
    .unwrap();

    let (rows, undated) = agg_rows(&postings, now);
    assert_eq!(undated, 1);
    assert_eq!(rows.len(), 2);

    let a = &rows["A"].data;
    assert_eq!(a["orders_7"], json!(2));
    assert_eq!(a["orders_14"], json!(2));
    assert_eq!(a["orders_28"], json!(3));
    assert_eq!(a["orders_90"], json!(3));

    let b = &rows["B"].data;
    assert_eq!(b["orders_60"], json!(0));
    assert_eq!(b["orders_90"], json!(4));
  }

  #[test]
  fn schema() {
    let cols = columns();
    assert_eq!(cols.len(), 6);
    assert_eq!(cols[5].key, "orders_90");
    assert_eq!(cols[5].label, "Заказы 90д");
  }
}
