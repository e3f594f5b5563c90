//! Per-job sync log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Outcome of one job within a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncStatus {
  /// All fetches succeeded.
  Ok,
  /// The job wrote data but some fetches were given up on.
  Partial,
  /// The job aborted; nothing was written.
  Failed,
}

/// One row of the sync log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
  pub run_id:       Uuid,
  pub shop_id:      i64,
  pub job:          String,
  pub status:       SyncStatus,
  pub message:      Option<String>,
  pub rows_written: usize,
  pub unresolved:   usize,
  pub warnings:     usize,
  pub started_at:   DateTime<Utc>,
  pub finished_at:  DateTime<Utc>,
}

impl SyncLogEntry {
  pub fn duration_ms(&self) -> i64 {
    (self.finished_at - self.started_at).num_milliseconds()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_serialises_lowercase() {
    assert_eq!(serde_json::to_string(&SyncStatus::Partial).unwrap(), "\"partial\"");
    assert_eq!("failed".parse::<SyncStatus>().unwrap(), SyncStatus::Failed);
  }
}
