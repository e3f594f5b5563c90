//! Decoding of downloaded spreadsheet reports.
//!
//! Columns are always located by header text. Report layouts change between
//! API versions; positions are not stable.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};
use serde_json::{Number, Value};

use crate::{ClientError, Result};

/// First worksheet of a workbook: one header row, then data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
  pub headers: Vec<String>,
  pub rows:    Vec<Vec<Value>>,
}

fn cell_value(cell: &Data) -> Value {
  match cell {
    Data::Int(i) => Value::from(*i),
    Data::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
    Data::String(s) => Value::String(s.trim().to_owned()),
    Data::Bool(b) => Value::Bool(*b),
    Data::DateTime(dt) => match dt.as_datetime() {
      Some(n) if n.time() == chrono::NaiveTime::MIN => Value::String(n.date().to_string()),
      Some(n) => Value::String(n.format("%Y-%m-%d %H:%M:%S").to_string()),
      None => Value::Null,
    },
    Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
    Data::Error(_) | Data::Empty => Value::Null,
  }
}

impl Sheet {
  pub fn new(headers: Vec<String>, rows: Vec<Vec<Value>>) -> Self { Self { headers, rows } }

  /// Decode the first worksheet of an xlsx workbook.
  pub fn from_xlsx(bytes: &[u8]) -> Result<Self> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes.to_vec()))
      .map_err(|e| ClientError::Sheet(format!("open workbook: {e}")))?;
    let range = workbook
      .worksheet_range_at(0)
      .ok_or_else(|| ClientError::Sheet("workbook has no sheets".into()))?
      .map_err(|e| ClientError::Sheet(format!("read sheet: {e}")))?;

    let mut rows = range.rows();
    let headers = rows
      .next()
      .map(|r| {
        r.iter()
          .map(|c| match cell_value(c) {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
          })
          .collect()
      })
      .unwrap_or_default();
    let rows = rows.map(|r| r.iter().map(cell_value).collect()).collect();

    Ok(Self { headers, rows })
  }

  /// Index of the column whose header equals `name` (trimmed).
  pub fn column(&self, name: &str) -> Option<usize> {
    self.headers.iter().position(|h| h.trim() == name)
  }

  /// Index of the first column whose header contains `needle`,
  /// case-insensitively.
  pub fn column_containing(&self, needle: &str) -> Option<usize> {
    let needle = needle.to_lowercase();
    self.headers.iter().position(|h| h.to_lowercase().contains(&needle))
  }

  /// Like [`column`](Self::column) but missing headers are an error.
  pub fn require(&self, name: &str) -> Result<usize> {
    self.column(name).ok_or_else(|| ClientError::Sheet(format!("missing column {name:?}")))
  }

  /// Cell `idx` of `row`; short rows read as `null`.
  pub fn cell(row: &[Value], idx: usize) -> &Value {
    static NULL: Value = Value::Null;
    row.get(idx).unwrap_or(&NULL)
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn sheet() -> Sheet {
    Sheet::new(
      vec!["Дата начисления".into(), "Склад".into(), "SKU".into()],
      vec![vec![json!("2024-05-01"), json!("Тверь"), json!(1001)], vec![json!("2024-05-02")]],
    )
  }

  #[test]
  fn headers_are_found_by_name() {
    let s = sheet();
    assert_eq!(s.column("SKU"), Some(2));
    assert_eq!(s.column_containing("дата"), Some(0));
    assert_eq!(s.column_containing("ДАТА"), Some(0));
    assert!(matches!(s.require("Кол-во экземпляров"), Err(ClientError::Sheet(_))));
  }

  #[test]
  fn short_rows_read_as_null() {
    let s = sheet();
    assert_eq!(Sheet::cell(&s.rows[1], 2), &Value::Null);
    assert_eq!(Sheet::cell(&s.rows[0], 2), &json!(1001));
  }

  #[test]
  fn garbage_is_not_a_workbook() {
    assert!(matches!(Sheet::from_xlsx(b"definitely not a zip"), Err(ClientError::Sheet(_))));
  }

  #[test]
  fn cells_convert_to_json() {
    assert_eq!(cell_value(&Data::Float(2.5)), json!(2.5));
    assert_eq!(cell_value(&Data::Int(3)), json!(3));
    assert_eq!(cell_value(&Data::String(" x ".into())), json!("x"));
    assert_eq!(cell_value(&Data::Empty), Value::Null);
  }
}
