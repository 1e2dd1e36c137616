//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Dates are stored as ISO 8601 (`YYYY-MM-DD`) so that `MAX(date_filed)`
//! and `ORDER BY date_filed` are chronological. Timestamps are RFC 3339.
//! UUIDs are hyphenated lowercase strings. Run counters are compact JSON.

use chrono::{DateTime, NaiveDate, Utc};
use efd_core::report::{
  IgnoredReport, IngestRun, ReportHeader, ReportKey, RunCounts, TradeRow,
  Transaction,
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Dates ────────────────────────────────────────────────────────────────────

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn encode_date(d: NaiveDate) -> String { d.format(DATE_FORMAT).to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Counters ─────────────────────────────────────────────────────────────────

pub fn encode_counts(c: &RunCounts) -> Result<String> { Ok(serde_json::to_string(c)?) }

pub fn decode_counts(s: &str) -> Result<RunCounts> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawHeader::from_row`].
pub const HEADER_COLUMNS: &str =
  "report_id, first_name, last_name, report_title, date_filed, report_link";

/// Raw values read directly from a `header` row.
pub struct RawHeader {
  pub report_id:    i64,
  pub first_name:   String,
  pub last_name:    String,
  pub report_title: String,
  pub date_filed:   String,
  pub report_link:  String,
}

impl RawHeader {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      report_id:    row.get(0)?,
      first_name:   row.get(1)?,
      last_name:    row.get(2)?,
      report_title: row.get(3)?,
      date_filed:   row.get(4)?,
      report_link:  row.get(5)?,
    })
  }

  pub fn into_header(self) -> Result<ReportHeader> {
    Ok(ReportHeader {
      report_id:    self.report_id,
      first_name:   self.first_name,
      last_name:    self.last_name,
      report_title: self.report_title,
      date_filed:   decode_date(&self.date_filed)?,
      report_link:  self.report_link,
    })
  }
}

/// Column list matching [`transaction_from_row`].
pub const TRANSACTION_COLUMNS: &str = "master_transaction_id, report_id, transaction_id, \
   transaction_date, owner, security, company, security_type, transaction_type, \
   amount_range, comment";

/// Decode a `transactions` row selected with [`TRANSACTION_COLUMNS`]; every
/// column maps natively.
pub fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
  transaction_at(row, 0)
}

fn transaction_at(row: &Row<'_>, base: usize) -> rusqlite::Result<Transaction> {
  Ok(Transaction {
    master_transaction_id: row.get(base)?,
    report_id:             row.get(base + 1)?,
    transaction_id:        row.get(base + 2)?,
    transaction_date:      row.get(base + 3)?,
    owner:                 row.get(base + 4)?,
    security:              row.get(base + 5)?,
    company:               row.get(base + 6)?,
    security_type:         row.get(base + 7)?,
    transaction_type:      row.get(base + 8)?,
    amount_range:          row.get(base + 9)?,
    comment:               row.get(base + 10)?,
  })
}

/// A row of the header ⋈ transactions join; the header half is kept raw
/// until the date is decoded.
pub struct RawTrade {
  pub header:      RawHeader,
  pub transaction: Transaction,
}

impl RawTrade {
  /// Expects [`HEADER_COLUMNS`] followed by [`TRANSACTION_COLUMNS`].
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      header:      RawHeader::from_row(row)?,
      transaction: transaction_at(row, 6)?,
    })
  }

  pub fn into_trade(self) -> Result<TradeRow> {
    let h = self.header.into_header()?;
    let t = self.transaction;
    Ok(TradeRow {
      report_id:        h.report_id,
      first_name:       h.first_name,
      last_name:        h.last_name,
      report_title:     h.report_title,
      date_filed:       h.date_filed,
      report_link:      h.report_link,
      transaction_id:   t.transaction_id,
      transaction_date: t.transaction_date,
      owner:            t.owner,
      security:         t.security,
      company:          t.company,
      security_type:    t.security_type,
      transaction_type: t.transaction_type,
      amount_range:     t.amount_range,
      comment:          t.comment,
    })
  }
}

/// Raw strings read from an `ignored_reports` row.
pub struct RawIgnored {
  pub run_id:       String,
  pub first_name:   String,
  pub last_name:    String,
  pub report_title: String,
  pub report_link:  Option<String>,
  pub date_filed:   Option<String>,
  pub recorded_at:  String,
}

/// Column list matching [`RawIgnored::from_row`].
pub const IGNORED_COLUMNS: &str =
  "run_id, first_name, last_name, report_title, report_link, date_filed, recorded_at";

impl RawIgnored {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      run_id:       row.get(0)?,
      first_name:   row.get(1)?,
      last_name:    row.get(2)?,
      report_title: row.get(3)?,
      report_link:  row.get(4)?,
      date_filed:   row.get(5)?,
      recorded_at:  row.get(6)?,
    })
  }

  pub fn into_ignored(self) -> Result<IgnoredReport> {
    Ok(IgnoredReport {
      run_id:      decode_uuid(&self.run_id)?,
      key:         ReportKey::new(self.first_name, self.last_name, self.report_title),
      report_link: self.report_link,
      date_filed:  self.date_filed.as_deref().map(decode_date).transpose()?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw strings read from an `ingest_runs` row.
pub struct RawRun {
  pub run_id:      String,
  pub started_at:  String,
  pub finished_at: String,
  pub since:       String,
  pub counts:      String,
}

impl RawRun {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      run_id:      row.get(0)?,
      started_at:  row.get(1)?,
      finished_at: row.get(2)?,
      since:       row.get(3)?,
      counts:      row.get(4)?,
    })
  }

  pub fn into_run(self) -> Result<IngestRun> {
    Ok(IngestRun {
      run_id:      decode_uuid(&self.run_id)?,
      started_at:  decode_dt(&self.started_at)?,
      finished_at: decode_dt(&self.finished_at)?,
      since:       decode_date(&self.since)?,
      counts:      decode_counts(&self.counts)?,
    })
  }
}
