//! [`SqliteStore`], the SQLite implementation of [`ReportStore`].

use std::{
  collections::{HashMap, HashSet},
  path::Path,
};

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use tally_core::{
  history::SyncLogEntry,
  report::{
    Column, EnsureOutcome, Report, ReportMeta, ReportView, Row, RowData, RowUpdates,
    UpsertOutcome, apply_patch,
  },
  store::ReportStore,
};

use crate::{
  Error, Result,
  encode::{RawColumn, RawReport, RawRow, RawSyncEntry, decode_data, encode_dt, encode_uuid},
  schema::SCHEMA,
};

/// Wrap a non-SQLite error raised inside a connection closure.
fn other(e: impl std::error::Error + Send + Sync + 'static) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(e))
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A report store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn report_by_id(&self, report_id: i64) -> Result<Option<Report>> {
    let raw: Option<RawReport> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM reports WHERE report_id = ?1", RawReport::COLUMNS),
              rusqlite::params![report_id],
              RawReport::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawReport::into_report).transpose()
  }
}

// ─── ReportStore impl ────────────────────────────────────────────────────────

impl ReportStore for SqliteStore {
  type Error = Error;

  // ── Reports ───────────────────────────────────────────────────────────────

  async fn get_or_create_report(&self, shop_id: i64, meta: ReportMeta) -> Result<Report> {
    let now = encode_dt(Utc::now());

    let raw: RawReport = self
      .conn
      .call(move |conn| {
        let select = format!(
          "SELECT {} FROM reports WHERE shop_id = ?1 AND code = ?2",
          RawReport::COLUMNS
        );
        let existing = conn
          .query_row(&select, rusqlite::params![shop_id, meta.code], RawReport::from_row)
          .optional()?;

        match existing {
          None => {
            conn.execute(
              "INSERT INTO reports (shop_id, code, title, description, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
              rusqlite::params![shop_id, meta.code, meta.title, meta.description, now],
            )?;
          }
          Some(r) if r.title != meta.title || r.description != meta.description => {
            conn.execute(
              "UPDATE reports SET title = ?2, description = ?3, updated_at = ?4
               WHERE report_id = ?1",
              rusqlite::params![r.report_id, meta.title, meta.description, now],
            )?;
          }
          Some(r) => return Ok(r),
        }

        Ok(conn.query_row(&select, rusqlite::params![shop_id, meta.code], RawReport::from_row)?)
      })
      .await?;

    raw.into_report()
  }

  async fn find_report(&self, shop_id: i64, code: &str) -> Result<Option<Report>> {
    let code = code.to_owned();

    let raw: Option<RawReport> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM reports WHERE shop_id = ?1 AND code = ?2",
                RawReport::COLUMNS
              ),
              rusqlite::params![shop_id, code],
              RawReport::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawReport::into_report).transpose()
  }

  async fn list_reports(&self, shop_id: i64) -> Result<Vec<Report>> {
    let raws: Vec<RawReport> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM reports WHERE shop_id = ?1 ORDER BY code",
          RawReport::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![shop_id], RawReport::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReport::into_report).collect()
  }

  // ── Columns ───────────────────────────────────────────────────────────────

  async fn ensure_columns(&self, report_id: i64, defs: &[Column]) -> Result<EnsureOutcome> {
    if self.report_by_id(report_id).await?.is_none() {
      return Err(Error::ReportNotFound(report_id));
    }
    let defs = defs.to_vec();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut outcome = EnsureOutcome::default();
        {
          let mut existing: HashMap<String, (String, i64, String)> = HashMap::new();
          let mut stmt = tx.prepare(
            "SELECT key, label, sort_order, data_type FROM report_columns WHERE report_id = ?1",
          )?;
          let rows = stmt.query_map(rusqlite::params![report_id], |row| {
            Ok((row.get::<_, String>(0)?, (row.get(1)?, row.get(2)?, row.get(3)?)))
          })?;
          for row in rows {
            let (key, fields) = row?;
            existing.insert(key, fields);
          }

          let mut insert = tx.prepare_cached(
            "INSERT INTO report_columns (report_id, key, label, sort_order, data_type)
             VALUES (?1, ?2, ?3, ?4, ?5)",
          )?;
          let mut update = tx.prepare_cached(
            "UPDATE report_columns SET label = ?3, sort_order = ?4, data_type = ?5
             WHERE report_id = ?1 AND key = ?2",
          )?;

          for def in &defs {
            let data_type = def.data_type.to_string();
            match existing.get(&def.key) {
              None => {
                insert.execute(rusqlite::params![report_id, def.key, def.label, def.order, data_type])?;
                existing.insert(def.key.clone(), (def.label.clone(), def.order, data_type));
                outcome.created += 1;
              }
              Some((label, order, dt))
                if *label == def.label && *order == def.order && *dt == data_type =>
              {
                outcome.unchanged += 1;
              }
              Some(_) => {
                update.execute(rusqlite::params![report_id, def.key, def.label, def.order, data_type])?;
                existing.insert(def.key.clone(), (def.label.clone(), def.order, data_type));
                outcome.updated += 1;
              }
            }
          }
        }
        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    tracing::debug!(
      report_id,
      created = outcome.created,
      updated = outcome.updated,
      "ensured report columns"
    );
    Ok(outcome)
  }

  async fn list_columns(&self, report_id: i64) -> Result<Vec<Column>> {
    let raws: Vec<RawColumn> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT key, label, sort_order, data_type FROM report_columns
           WHERE report_id = ?1
           ORDER BY sort_order, column_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![report_id], |row| {
            Ok(RawColumn {
              key:       row.get(0)?,
              label:     row.get(1)?,
              order:     row.get(2)?,
              data_type: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawColumn::into_column).collect()
  }

  // ── Rows ──────────────────────────────────────────────────────────────────

  async fn upsert_rows(&self, report_id: i64, updates: RowUpdates) -> Result<UpsertOutcome> {
    if updates.is_empty() {
      return Ok(UpsertOutcome::default());
    }
    if self.report_by_id(report_id).await?.is_none() {
      return Err(Error::ReportNotFound(report_id));
    }
    let now = encode_dt(Utc::now());
    let batch = updates.len();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut outcome = UpsertOutcome::default();
        {
          let mut lookup = tx.prepare_cached(
            "SELECT sort_key, data FROM report_rows WHERE report_id = ?1 AND row_key = ?2",
          )?;
          let mut insert = tx.prepare_cached(
            "INSERT INTO report_rows (report_id, row_key, sort_key, data, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
          )?;
          let mut update = tx.prepare_cached(
            "UPDATE report_rows SET sort_key = ?3, data = ?4, updated_at = ?5
             WHERE report_id = ?1 AND row_key = ?2",
          )?;

          for (row_key, patch) in updates {
            let existing: Option<(String, String)> = lookup
              .query_row(rusqlite::params![report_id, row_key], |row| Ok((row.get(0)?, row.get(1)?)))
              .optional()?;
            match existing {
              Some((mut sort_key, data)) => {
                let mut data: RowData = decode_data(&data).map_err(other)?;
                apply_patch(&mut data, &mut sort_key, &patch);
                let json = serde_json::to_string(&data).map_err(other)?;
                update.execute(rusqlite::params![report_id, row_key, sort_key, json, now])?;
                outcome.updated += 1;
              }
              None => {
                let mut data = RowData::new();
                let mut sort_key = String::new();
                apply_patch(&mut data, &mut sort_key, &patch);
                let json = serde_json::to_string(&data).map_err(other)?;
                insert.execute(rusqlite::params![report_id, row_key, sort_key, json, now])?;
                outcome.created += 1;
              }
            }
          }
        }
        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    tracing::debug!(
      report_id,
      batch,
      created = outcome.created,
      updated = outcome.updated,
      "upserted report rows"
    );
    Ok(outcome)
  }

  async fn list_rows(&self, report_id: i64) -> Result<Vec<Row>> {
    let raws: Vec<RawRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT row_key, sort_key, data, updated_at FROM report_rows
           WHERE report_id = ?1
           ORDER BY sort_key, row_key",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![report_id], |row| {
            Ok(RawRow {
              row_key:    row.get(0)?,
              sort_key:   row.get(1)?,
              data:       row.get(2)?,
              updated_at: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRow::into_row).collect()
  }

  async fn view(&self, shop_id: i64, code: &str) -> Result<Option<ReportView>> {
    let report = match self.find_report(shop_id, code).await? {
      Some(r) => r,
      None => return Ok(None),
    };

    let columns = self.list_columns(report.report_id).await?;
    let rows = self.list_rows(report.report_id).await?;

    Ok(Some(ReportView { code: report.code, title: report.title, columns, rows }))
  }

  // ── Cluster slots ─────────────────────────────────────────────────────────

  async fn cluster_slots(&self, shop_id: i64, codes: &[String]) -> Result<HashMap<String, i64>> {
    let wanted: HashSet<String> = codes.iter().cloned().collect();

    let all: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare("SELECT code, cluster_id FROM cluster_slots WHERE shop_id = ?1")?;
        let rows = stmt
          .query_map(rusqlite::params![shop_id], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(all.into_iter().filter(|(code, _)| wanted.contains(code)).collect())
  }

  async fn bind_cluster_slot(&self, shop_id: i64, code: &str, cluster_id: i64) -> Result<()> {
    let code = code.to_owned();
    let now = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO cluster_slots (shop_id, code, cluster_id, bound_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (shop_id, code) DO UPDATE SET
             cluster_id = excluded.cluster_id,
             bound_at   = excluded.bound_at",
          rusqlite::params![shop_id, code, cluster_id, now],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Sync log ──────────────────────────────────────────────────────────────

  async fn record_sync(&self, entry: SyncLogEntry) -> Result<()> {
    let run_id      = encode_uuid(entry.run_id);
    let status      = entry.status.to_string();
    let started_at  = encode_dt(entry.started_at);
    let finished_at = encode_dt(entry.finished_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sync_log (
             run_id, shop_id, job, status, message,
             rows_written, unresolved, warnings, started_at, finished_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            run_id,
            entry.shop_id,
            entry.job,
            status,
            entry.message,
            entry.rows_written as i64,
            entry.unresolved as i64,
            entry.warnings as i64,
            started_at,
            finished_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn sync_history(&self, shop_id: i64, limit: usize) -> Result<Vec<SyncLogEntry>> {
    let limit = limit as i64;

    let raws: Vec<RawSyncEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT run_id, shop_id, job, status, message,
                  rows_written, unresolved, warnings, started_at, finished_at
           FROM sync_log
           WHERE shop_id = ?1
           ORDER BY started_at DESC, entry_id DESC
           LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![shop_id, limit], |row| {
            Ok(RawSyncEntry {
              run_id:       row.get(0)?,
              shop_id:      row.get(1)?,
              job:          row.get(2)?,
              status:       row.get(3)?,
              message:      row.get(4)?,
              rows_written: row.get(5)?,
              unresolved:   row.get(6)?,
              warnings:     row.get(7)?,
              started_at:   row.get(8)?,
              finished_at:  row.get(9)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSyncEntry::into_entry).collect()
  }
}
