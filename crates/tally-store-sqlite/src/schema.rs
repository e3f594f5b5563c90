//! SQL schema for the Tally SQLite store.
//!
//! Executed once at connection startup. Later migrations are gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS reports (
    report_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    shop_id     INTEGER NOT NULL,
    code        TEXT NOT NULL,
    title       TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE (shop_id, code)
);

-- Columns are only ever added or relabelled, never dropped.
CREATE TABLE IF NOT EXISTS report_columns (
    column_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id  INTEGER NOT NULL REFERENCES reports(report_id),
    key        TEXT NOT NULL,
    label      TEXT NOT NULL,
    sort_order INTEGER NOT NULL,
    data_type  TEXT NOT NULL DEFAULT 'text',   -- 'text' | 'number' | 'date'
    UNIQUE (report_id, key)
);

-- Rows are never deleted. `data` is a sparse JSON object keyed by column key.
CREATE TABLE IF NOT EXISTS report_rows (
    row_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id  INTEGER NOT NULL REFERENCES reports(report_id),
    row_key    TEXT NOT NULL,
    sort_key   TEXT NOT NULL DEFAULT '',
    data       TEXT NOT NULL DEFAULT '{}',
    updated_at TEXT NOT NULL,
    UNIQUE (report_id, row_key)
);

-- Dimension id bound to a fixed output slot, per shop.
CREATE TABLE IF NOT EXISTS cluster_slots (
    shop_id    INTEGER NOT NULL,
    code       TEXT NOT NULL,
    cluster_id INTEGER NOT NULL,
    bound_at   TEXT NOT NULL,
    PRIMARY KEY (shop_id, code)
);

CREATE TABLE IF NOT EXISTS sync_log (
    entry_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id       TEXT NOT NULL,
    shop_id      INTEGER NOT NULL,
    job          TEXT NOT NULL,
    status       TEXT NOT NULL,               -- 'ok' | 'partial' | 'failed'
    message      TEXT,
    rows_written INTEGER NOT NULL DEFAULT 0,
    unresolved   INTEGER NOT NULL DEFAULT 0,
    warnings     INTEGER NOT NULL DEFAULT 0,
    started_at   TEXT NOT NULL,
    finished_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS report_rows_sort_idx ON report_rows(report_id, sort_key, row_key);
CREATE INDEX IF NOT EXISTS sync_log_shop_idx    ON sync_log(shop_id, started_at);

PRAGMA user_version = 1;
";
