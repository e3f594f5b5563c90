//! Encoding and decoding between domain types and SQLite column values.
//!
//! Timestamps are RFC 3339 strings, row data is compact JSON, run ids are
//! hyphenated lowercase UUIDs.

use chrono::{DateTime, Utc};
use tally_core::{
  history::{SyncLogEntry, SyncStatus},
  report::{Column, DataType, Report, Row, RowData},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_data_type(s: &str) -> Result<DataType> {
  s.parse()
    .map_err(|_| tally_core::Error::UnknownDataType(s.to_owned()).into())
}

pub fn decode_status(s: &str) -> Result<SyncStatus> {
  s.parse()
    .map_err(|_| tally_core::Error::UnknownStatus(s.to_owned()).into())
}

/// Decode a stored row payload. Anything but a JSON object is treated as
/// empty.
pub fn decode_data(s: &str) -> Result<RowData> {
  match serde_json::from_str(s)? {
    serde_json::Value::Object(m) => Ok(m),
    _ => Ok(RowData::new()),
  }
}

// ─── Raw rows ────────────────────────────────────────────────────────────────

pub struct RawReport {
  pub report_id:   i64,
  pub shop_id:     i64,
  pub code:        String,
  pub title:       String,
  pub description: String,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawReport {
  pub const COLUMNS: &'static str =
    "report_id, shop_id, code, title, description, created_at, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      report_id:   row.get(0)?,
      shop_id:     row.get(1)?,
      code:        row.get(2)?,
      title:       row.get(3)?,
      description: row.get(4)?,
      created_at:  row.get(5)?,
      updated_at:  row.get(6)?,
    })
  }

  pub fn into_report(self) -> Result<Report> {
    Ok(Report {
      report_id:   self.report_id,
      shop_id:     self.shop_id,
      code:        self.code,
      title:       self.title,
      description: self.description,
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawColumn {
  pub key:       String,
  pub label:     String,
  pub order:     i64,
  pub data_type: String,
}

impl RawColumn {
  pub fn into_column(self) -> Result<Column> {
    Ok(Column {
      data_type: decode_data_type(&self.data_type)?,
      key:       self.key,
      label:     self.label,
      order:     self.order,
    })
  }
}

pub struct RawRow {
  pub row_key:    String,
  pub sort_key:   String,
  pub data:       String,
  pub updated_at: String,
}

impl RawRow {
  pub fn into_row(self) -> Result<Row> {
    Ok(Row {
      data:       decode_data(&self.data)?,
      updated_at: decode_dt(&self.updated_at)?,
      row_key:    self.row_key,
      sort_key:   self.sort_key,
    })
  }
}

pub struct RawSyncEntry {
  pub run_id:       String,
  pub shop_id:      i64,
  pub job:          String,
  pub status:       String,
  pub message:      Option<String>,
  pub rows_written: i64,
  pub unresolved:   i64,
  pub warnings:     i64,
  pub started_at:   String,
  pub finished_at:  String,
}

impl RawSyncEntry {
  pub fn into_entry(self) -> Result<SyncLogEntry> {
    Ok(SyncLogEntry {
      run_id:       Uuid::parse_str(&self.run_id)?,
      shop_id:      self.shop_id,
      job:          self.job,
      status:       decode_status(&self.status)?,
      message:      self.message,
      rows_written: self.rows_written.max(0) as usize,
      unresolved:   self.unresolved.max(0) as usize,
      warnings:     self.warnings.max(0) as usize,
      started_at:   decode_dt(&self.started_at)?,
      finished_at:  decode_dt(&self.finished_at)?,
    })
  }
}
