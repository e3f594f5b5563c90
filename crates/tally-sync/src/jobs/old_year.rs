//! Delivered quantities per offer for the three calendar months following
//! the current one, a year ago.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::Value;
use tally_client::{Transport, records::Posting};
use tally_core::{
  report::{Column, DataType, ReportMeta, RowPatch, RowUpdates},
  store::ReportStore,
  window::{DELIVERED, last_year_month_range},
};
use tracing::debug;

use super::JobOutput;
use crate::{Result, SyncError, context::RunContext};

pub const MONTH_ROW: &str = "__month__";
pub const RANGE_ROW: &str = "__range__";

/// Months ahead of the current one whose last-year data is shown.
pub const MONTH_OFFSETS: [u32; 3] = [1, 2, 3];

const MONTH_NAMES: [&str; 12] = [
  "Январь", "Февраль", "Март", "Апрель", "Май", "Июнь", "Июль", "Август", "Сентябрь", "Октябрь",
  "Ноябрь", "Декабрь",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
  Fbo,
  Fbs,
}

impl Side {
  pub fn code(self) -> &'static str {
    match self {
      Self::Fbo => "orders_fbo_old_year",
      Self::Fbs => "orders_fbs_old_year",
    }
  }

  pub fn meta(self) -> ReportMeta {
    match self {
      Self::Fbo => ReportMeta::new(self.code(), "FBO прошлый год", "HH/HJ/HL как в таблице"),
      Self::Fbs => ReportMeta::new(self.code(), "FBS прошлый год", "HI/HK/HM/HN как в таблице"),
    }
  }

  /// One column per month offset.
  pub fn month_columns(self) -> [&'static str; 3] {
    match self {
      Self::Fbo => ["HH", "HJ", "HL"],
      Self::Fbs => ["HI", "HK", "HM"],
    }
  }

  pub fn columns(self) -> Vec<Column> {
    let data_type = match self {
      Self::Fbo => DataType::Text,
      Self::Fbs => DataType::Number,
    };
    let mut out = vec![Column::new("offer_id", "Артикул", 10, DataType::Text)];
    for (i, key) in self.month_columns().into_iter().enumerate() {
      out.push(Column::new(key, key, 20 + 10 * i as i64, data_type));
    }
    if self == Self::Fbs {
      out.push(Column::new("HN", "HN", 50, DataType::Number));
    }
    out
  }
}

pub fn month_name(date: NaiveDate) -> &'static str { MONTH_NAMES[date.month0() as usize] }

/// `dd.mm.yy dd.mm.yy`
pub fn range_label(first: NaiveDate, last: NaiveDate) -> String {
  format!("{} {}", first.format("%d.%m.%y"), last.format("%d.%m.%y"))
}

/// Local month bounds as UTC instants: first day 00:00:00 to last day
/// 23:59:59.
pub fn month_bounds(first: NaiveDate, last: NaiveDate, offset: FixedOffset) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
  let start = offset.from_local_datetime(&first.and_time(NaiveTime::MIN)).single()?;
  let end = offset.from_local_datetime(&last.and_hms_opt(23, 59, 59)?).single()?;
  Some((start.with_timezone(&Utc), end.with_timezone(&Utc)))
}

/// Delivered quantity per offer.
pub fn delivered_counts(postings: &[Posting]) -> HashMap<String, i64> {
  let mut out = HashMap::new();
  for p in postings {
    if let Some(status) = p.status.as_deref()
      && !status.eq_ignore_ascii_case(DELIVERED)
    {
      continue;
    }
    for line in &p.products {
      let offer = line.offer_id.trim();
      if !offer.is_empty() {
        *out.entry(offer.to_owned()).or_default() += line.quantity;
      }
    }
  }
  out
}

/// Header rows plus one row per catalog offer.
pub fn old_year_rows(
  side: Side,
  months: &[(NaiveDate, NaiveDate); 3],
  counts: &[HashMap<String, i64>; 3],
  offers: &[String],
) -> RowUpdates {
  let cols = side.month_columns();
  let mut rows = RowUpdates::new();

  let mut range = RowPatch::new().with("offer_id", "Период");
  for (key, (first, last)) in cols.iter().zip(months) {
    range.set(*key, range_label(*first, *last));
  }

  match side {
    Side::Fbo => {
      let mut month = RowPatch::new().with("offer_id", "Месяц").sorted_by("0");
      for (key, (first, _)) in cols.iter().zip(months) {
        month.set(*key, month_name(*first));
      }
      rows.insert(MONTH_ROW.to_owned(), month);
      rows.insert(RANGE_ROW.to_owned(), range.sorted_by("1"));
    }
    Side::Fbs => {
      rows.insert(RANGE_ROW.to_owned(), range.with("HN", "").sorted_by("0"));
    }
  }

  let offer_sort = if side == Side::Fbo { "2" } else { "1" };
  for offer in offers {
    let mut patch = RowPatch::new().with("offer_id", offer.as_str()).sorted_by(offer_sort);
    let mut sum = 0;
    for (key, c) in cols.iter().zip(counts) {
      let v = c.get(offer).copied().unwrap_or(0);
      sum += v;
      patch.set(*key, v);
    }
    if side == Side::Fbs {
      patch.set("HN", Value::from(sum));
    }
    rows.insert(offer.clone(), patch);
  }
  rows
}

pub async fn run<S: ReportStore, T: Transport>(ctx: &RunContext<'_, S, T>, side: Side) -> Result<JobOutput> {
  let batching = ctx.settings.batching(ctx.settings.pools.old_year);
  let anchor = ctx.anchor();

  let mut months = [(anchor, anchor); 3];
  let mut counts: [HashMap<String, i64>; 3] = Default::default();
  for (i, k) in MONTH_OFFSETS.into_iter().enumerate() {
    let (first, last) = last_year_month_range(anchor, k)
      .ok_or_else(|| SyncError::Layout(format!("no calendar month {k} after {anchor}")))?;
    let (since, to) = month_bounds(first, last, ctx.offset())
      .ok_or_else(|| SyncError::Layout(format!("unrepresentable month {first}")))?;
    let postings = match side {
      Side::Fbo => ctx.client.fbo_postings(since, to, Some(DELIVERED), &batching).await?,
      Side::Fbs => ctx.client.fbs_postings(since, to, Some(DELIVERED), &batching).await?,
    };
    debug!(month = %first, postings = postings.len(), "prior-year month fetched");
    months[i] = (first, last);
    counts[i] = delivered_counts(&postings);
  }

  let offers = ctx.catalog().await?.offer_ids();
  let rows = old_year_rows(side, &months, &counts, &offers);
  Ok(JobOutput::written(ctx.write(side.meta(), &side.columns(), rows).await?))
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn d(y: i32, m: u32, day: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, day).unwrap() }

  fn months() -> [(NaiveDate, NaiveDate); 3] {
    [(d(2023, 12, 1), d(2023, 12, 31)), (d(2024, 1, 1), d(2024, 1, 31)), (d(2024, 2, 1), d(2024, 2, 29))]
  }

  fn counts() -> [HashMap<String, i64>; 3] {
    let one: HashMap<String, i64> = [("OF-1".to_string(), 4)].into();
    let two: HashMap<String, i64> = [("OF-1".to_string(), 1), ("OF-2".to_string(), 3)].into();
    [one, two, HashMap::new()]
  }

  #[test]
  fn fbo_rows_have_month_and_range_headers() {
    let rows = old_year_rows(Side::Fbo, &months(), &counts(), &["OF-1".into(), "OF-2".into()]);
    assert_eq!(rows[MONTH_ROW].data["HH"], json!("Декабрь"));
    assert_eq!(rows[MONTH_ROW].data["HL"], json!("Февраль"));
    assert_eq!(rows[RANGE_ROW].data["HJ"], json!("01.01.24 31.01.24"));
    assert_eq!(rows[RANGE_ROW].sort_key.as_deref(), Some("1"));
    assert_eq!(rows["OF-1"].data["HH"], json!(4));
    assert_eq!(rows["OF-2"].data["HL"], json!(0));
    assert_eq!(rows["OF-2"].sort_key.as_deref(), Some("2"));
    assert!(!rows["OF-1"].data.contains_key("HN"));
  }

  #[test]
  fn fbs_rows_carry_a_sum() {
    let rows = old_year_rows(Side::Fbs, &months(), &counts(), &["OF-1".into()]);
    assert!(!rows.contains_key(MONTH_ROW));
    assert_eq!(rows[RANGE_ROW].data["HN"], json!(""));
    assert_eq!(rows[RANGE_ROW].sort_key.as_deref(), Some("0"));
    assert_eq!(rows["OF-1"].data["HI"], json!(4));
    assert_eq!(rows["OF-1"].data["HN"], json!(5));
    assert_eq!(rows["OF-1"].sort_key.as_deref(), Some("1"));
  }

  #[test]
  fn only_delivered_postings_count() {
    let postings: Vec<Posting> = serde_json::from_value(json!([
      { "status": "delivered", "products": [{ "offer_id": "A", "quantity": 2 }] },
      { "status": "cancelled", "products": [{ "offer_id": "A", "quantity": 7 }] },
      { "products": [{ "offer_id": "A", "quantity": 1 }] },
    ]))
    .unwrap();
    assert_eq!(delivered_counts(&postings)["A"], 3);
  }

  #[test]
  fn month_bounds_are_local() {
    let msk = FixedOffset::east_opt(3 * 3600).unwrap();
    let (since, to) = month_bounds(d(2023, 12, 1), d(2023, 12, 31), msk).unwrap();
    assert_eq!(since.to_rfc3339(), "2023-11-30T21:00:00+00:00");
    assert_eq!(to.to_rfc3339(), "2023-12-31T20:59:59+00:00");
  }
}
