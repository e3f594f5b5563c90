//! Time-window aggregation of order events.
//!
//! Given a flat list of events and an anchor date in a fixed timezone, builds
//! a per-entity daily matrix, rolling period sums and delivered-only sums. The
//! function is pure: the anchor is an input, never read from the clock.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status value that qualifies an event for the delivered-only sums.
pub const DELIVERED: &str = "delivered";

/// One quantity observation for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
  /// Raw timestamp as returned by the source. Parsed during aggregation.
  pub timestamp:  String,
  pub entity_key: String,
  pub quantity:   i64,
  #[serde(default)]
  pub status:     Option<String>,
}

impl Event {
  pub fn new(
    timestamp: impl Into<String>,
    entity_key: impl Into<String>,
    quantity: i64,
    status: Option<&str>,
  ) -> Self {
    Self {
      timestamp:  timestamp.into(),
      entity_key: entity_key.into(),
      quantity,
      status:     status.map(str::to_owned),
    }
  }

  fn is_delivered(&self) -> bool {
    self.status.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(DELIVERED))
  }
}

/// Window sizes and period sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSpec {
  /// Width of the daily matrix.
  pub days:              u32,
  pub periods:           Vec<u32>,
  pub delivered_periods: Vec<u32>,
}

impl Default for WindowSpec {
  fn default() -> Self {
    Self {
      days:              28,
      periods:           vec![7, 14, 28, 60, 90],
      delivered_periods: vec![30, 60, 90],
    }
  }
}

/// Output of [`aggregate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowAggregate {
  pub anchor:         NaiveDate,
  /// Calendar days of the matrix, oldest first.
  pub dates:          Vec<NaiveDate>,
  /// entity → quantity per day, aligned with `dates`.
  pub daily:          BTreeMap<String, Vec<i64>>,
  /// Sum over all entities per day, aligned with `dates`.
  pub daily_totals:   Vec<i64>,
  /// period → entity → quantity.
  pub period_sums:    BTreeMap<u32, BTreeMap<String, i64>>,
  /// period → entity → delivered quantity.
  pub delivered_sums: BTreeMap<u32, BTreeMap<String, i64>>,
  /// Events whose timestamp could not be parsed.
  pub dropped:        usize,
}

impl WindowAggregate {
  pub fn period_sum(&self, period: u32, entity: &str) -> i64 {
    self.period_sums.get(&period).and_then(|m| m.get(entity)).copied().unwrap_or(0)
  }

  pub fn delivered_sum(&self, period: u32, entity: &str) -> i64 {
    self.delivered_sums.get(&period).and_then(|m| m.get(entity)).copied().unwrap_or(0)
  }

  /// Daily vector for `entity`; all zeros if it had no events.
  pub fn daily_for(&self, entity: &str) -> Vec<i64> {
    self.daily.get(entity).cloned().unwrap_or_else(|| vec![0; self.dates.len()])
  }

  /// `dd.mm` labels for the matrix columns.
  pub fn date_labels(&self) -> Vec<String> {
    self.dates.iter().map(|d| d.format("%d.%m").to_string()).collect()
  }
}

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"];

/// Parse a source timestamp. Offset-less forms are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
  let raw = raw.trim();
  if raw.is_empty() {
    return None;
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(dt.with_timezone(&Utc));
  }
  NAIVE_FORMATS
    .iter()
    .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
    .map(|n| n.and_utc())
}

/// Calendar date of `now` in the given timezone.
pub fn anchor_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
  now.with_timezone(&offset).date_naive()
}

/// First and last day of the calendar month `month_offset` months after the
/// anchor's month, one year earlier.
pub fn last_year_month_range(anchor: NaiveDate, month_offset: u32) -> Option<(NaiveDate, NaiveDate)> {
  let mut month = anchor.month() + month_offset;
  let mut year = anchor.year();
  while month > 12 {
    month -= 12;
    year += 1;
  }
  let year = year - 1;
  let first = NaiveDate::from_ymd_opt(year, month, 1)?;
  let next = if month == 12 {
    NaiveDate::from_ymd_opt(year + 1, 1, 1)?
  } else {
    NaiveDate::from_ymd_opt(year, month + 1, 1)?
  };
  Some((first, next - Duration::days(1)))
}

/// Aggregate `events` relative to `anchor`, interpreting timestamps in
/// `offset`.
pub fn aggregate(
  events: &[Event],
  anchor: NaiveDate,
  offset: FixedOffset,
  spec: &WindowSpec,
) -> WindowAggregate {
  let days = spec.days as i64;
  let dates: Vec<NaiveDate> =
    (0..days).map(|i| anchor - Duration::days(days - 1 - i)).collect();

  let mut out = WindowAggregate {
    anchor,
    daily_totals: vec![0; dates.len()],
    period_sums: spec.periods.iter().map(|p| (*p, BTreeMap::new())).collect(),
    delivered_sums: spec.delivered_periods.iter().map(|p| (*p, BTreeMap::new())).collect(),
    dates,
    ..Default::default()
  };

  for ev in events {
    let Some(ts) = parse_timestamp(&ev.timestamp) else {
      tracing::debug!(timestamp = %ev.timestamp, entity = %ev.entity_key, "dropping event with unparseable timestamp");
      out.dropped += 1;
      continue;
    };
    let day = ts.with_timezone(&offset).date_naive();
    let delta = (anchor - day).num_days();

    let row = out.daily.entry(ev.entity_key.clone()).or_insert_with(|| vec![0; days as usize]);
    if (0..days).contains(&delta) {
      let idx = (days - 1 - delta) as usize;
      row[idx] += ev.quantity;
      out.daily_totals[idx] += ev.quantity;
    }

    if delta < 0 {
      continue;
    }
    for (period, sums) in out.period_sums.iter_mut() {
      if delta <= *period as i64 - 1 {
        *sums.entry(ev.entity_key.clone()).or_default() += ev.quantity;
      }
    }
    if ev.is_delivered() {
      for (period, sums) in out.delivered_sums.iter_mut() {
        if delta <= *period as i64 - 1 {
          *sums.entry(ev.entity_key.clone()).or_default() += ev.quantity;
        }
      }
    }
  }

  if out.dropped > 0 {
    tracing::warn!(dropped = out.dropped, "events dropped during window aggregation");
  }
  out
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn msk() -> FixedOffset { FixedOffset::east_opt(3 * 3600).unwrap() }

  fn anchor() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 5, 20).unwrap() }

  /// Noon local time, `back` days before the anchor, as a UTC `Z` string.
  fn at(back: i64) -> String {
    let local = (anchor() - Duration::days(back)).and_hms_opt(12, 0, 0).unwrap();
    msk()
      .from_local_datetime(&local)
      .unwrap()
      .with_timezone(&Utc)
      .format("%Y-%m-%dT%H:%M:%SZ")
      .to_string()
  }

  #[test]
  fn scenario_two_events_two_periods() {
    let events = vec![Event::new(at(2), "X123", 3, None), Event::new(at(10), "X123", 5, None)];
    let spec = WindowSpec { periods: vec![7, 14], ..Default::default() };
    let agg = aggregate(&events, anchor(), msk(), &spec);
    assert_eq!(agg.period_sum(7, "X123"), 3);
    assert_eq!(agg.period_sum(14, "X123"), 8);
  }

  #[test]
  fn period_boundary_is_inclusive_of_period_minus_one() {
    let events = vec![Event::new(at(6), "A", 1, None), Event::new(at(7), "A", 10, None)];
    let spec = WindowSpec { periods: vec![7], ..Default::default() };
    let agg = aggregate(&events, anchor(), msk(), &spec);
    assert_eq!(agg.period_sum(7, "A"), 1);
  }

  #[test]
  fn periods_longer_than_a_year_keep_old_events() {
    let events = vec![Event::new(at(380), "A", 5, Some("delivered")), Event::new(at(400), "A", 7, None)];
    let spec = WindowSpec { periods: vec![400], delivered_periods: vec![390], ..Default::default() };
    let agg = aggregate(&events, anchor(), msk(), &spec);
    assert_eq!(agg.period_sum(400, "A"), 5);
    assert_eq!(agg.delivered_sum(390, "A"), 5);
  }

  #[test]
  fn daily_sum_matches_period_of_same_width() {
    let events: Vec<Event> =
      (0..40).map(|i| Event::new(at(i), if i % 2 == 0 { "A" } else { "B" }, i + 1, None)).collect();
    let agg = aggregate(&events, anchor(), msk(), &WindowSpec::default());
    for entity in ["A", "B"] {
      let daily: i64 = agg.daily_for(entity).iter().sum();
      assert_eq!(daily, agg.period_sum(28, entity));
    }
    let totals: i64 = agg.daily_totals.iter().sum();
    assert_eq!(totals, agg.period_sum(28, "A") + agg.period_sum(28, "B"));
  }

  #[test]
  fn daily_matrix_has_zeros_and_is_oldest_first() {
    let events = vec![Event::new(at(0), "A", 4, None)];
    let agg = aggregate(&events, anchor(), msk(), &WindowSpec::default());
    let row = agg.daily_for("A");
    assert_eq!(row.len(), 28);
    assert_eq!(row[27], 4);
    assert!(row[..27].iter().all(|v| *v == 0));
    assert_eq!(agg.dates.first(), Some(&(anchor() - Duration::days(27))));
    assert_eq!(agg.date_labels().last().map(String::as_str), Some("20.05"));
    assert_eq!(agg.daily_for("missing"), vec![0; 28]);
  }

  #[test]
  fn unparseable_timestamps_are_dropped() {
    let events = vec![Event::new("garbage", "A", 100, None), Event::new(at(1), "A", 2, None)];
    let agg = aggregate(&events, anchor(), msk(), &WindowSpec::default());
    assert_eq!(agg.dropped, 1);
    assert_eq!(agg.period_sum(7, "A"), 2);
  }

  #[test]
  fn delivered_only_is_case_insensitive() {
    let events = vec![
      Event::new(at(1), "A", 2, Some("Delivered")),
      Event::new(at(1), "A", 5, Some("cancelled")),
      Event::new(at(40), "A", 7, Some("delivered")),
    ];
    let agg = aggregate(&events, anchor(), msk(), &WindowSpec::default());
    assert_eq!(agg.delivered_sum(30, "A"), 2);
    assert_eq!(agg.delivered_sum(60, "A"), 9);
    assert_eq!(agg.period_sum(7, "A"), 7);
  }

  #[test]
  fn timezone_shifts_the_calendar_day() {
    // 22:30 UTC on the 19th is 01:30 on the 20th at UTC+3.
    let events = vec![Event::new("2024-05-19T22:30:00.123Z", "A", 1, None)];
    let agg = aggregate(&events, anchor(), msk(), &WindowSpec::default());
    assert_eq!(agg.daily_for("A")[27], 1);
  }

  #[test]
  fn aggregation_is_deterministic() {
    let events = vec![Event::new(at(3), "A", 1, None), Event::new(at(50), "B", 2, Some("delivered"))];
    let a = aggregate(&events, anchor(), msk(), &WindowSpec::default());
    let b = aggregate(&events, anchor(), msk(), &WindowSpec::default());
    assert_eq!(a, b);
  }

  #[test]
  fn last_year_months_wrap_the_year() {
    let nov = NaiveDate::from_ymd_opt(2024, 11, 3).unwrap();
    let (first, last) = last_year_month_range(nov, 2).unwrap();
    assert_eq!(first, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    assert_eq!(last, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());

    let (first, last) = last_year_month_range(nov, 1).unwrap();
    assert_eq!(first, NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
    assert_eq!(last, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
  }

  #[test]
  fn parses_common_forms() {
    assert!(parse_timestamp("2024-05-01T10:00:00Z").is_some());
    assert!(parse_timestamp("2024-05-01T10:00:00.5+03:00").is_some());
    assert!(parse_timestamp("2024-05-01 10:00:00").is_some());
    assert!(parse_timestamp("").is_none());
  }
}
