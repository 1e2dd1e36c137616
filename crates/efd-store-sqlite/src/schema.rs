//! SQL schema for the report store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per authoritative report. Rows are inserted, never updated.
CREATE TABLE IF NOT EXISTS header (
    report_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name   TEXT NOT NULL,
    last_name    TEXT NOT NULL,
    report_title TEXT NOT NULL,
    date_filed   TEXT NOT NULL,   -- ISO 8601 date; sorts chronologically
    report_link  TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS transactions (
    master_transaction_id INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id        INTEGER NOT NULL
                     REFERENCES header(report_id) ON DELETE CASCADE,
    transaction_id   INTEGER NOT NULL,   -- ordinal within the report
    transaction_date TEXT NOT NULL,
    owner            TEXT NOT NULL,
    security         TEXT NOT NULL,
    company          TEXT NOT NULL,
    security_type    TEXT NOT NULL,
    transaction_type TEXT NOT NULL,
    amount_range     TEXT NOT NULL,
    comment          TEXT NOT NULL,
    UNIQUE (report_id, transaction_id)
);

-- Audit log of logical identities excluded as superseded.
CREATE TABLE IF NOT EXISTS ignored_reports (
    ignored_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id       TEXT NOT NULL,
    first_name   TEXT NOT NULL,
    last_name    TEXT NOT NULL,
    report_title TEXT NOT NULL,
    report_link  TEXT,           -- matching scraped header, if any
    date_filed   TEXT,
    recorded_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ingest_runs (
    run_id      TEXT PRIMARY KEY,
    started_at  TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    since       TEXT NOT NULL,
    counts      TEXT NOT NULL    -- JSON-encoded RunCounts
);

-- Boundary date cleared by a run that has not finished yet. At most one row.
CREATE TABLE IF NOT EXISTS pending_watermark (
    id    INTEGER PRIMARY KEY CHECK (id = 1),
    since TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS header_date_idx ON header(date_filed);
CREATE INDEX IF NOT EXISTS header_key_idx
    ON header(first_name, last_name, report_title);
CREATE INDEX IF NOT EXISTS transactions_report_idx ON transactions(report_id);

PRAGMA user_version = 1;
";
