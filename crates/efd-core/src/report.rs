//! Report headers, transactions and the audit records kept alongside them.
//!
//! Headers are immutable once stored: an amendment is a new header, never an
//! update of the original. Transactions always belong to exactly one header.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Store-assigned surrogate key of a report header.
pub type ReportId = i64;

// ─── Identity ────────────────────────────────────────────────────────────────

/// The logical identity of a report: filer plus title.
///
/// The filing date is not part of it: an original and its
/// amendments share the filer part and differ only in the title.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ReportKey {
  pub first_name:   String,
  pub last_name:    String,
  pub report_title: String,
}

impl ReportKey {
  pub fn new(
    first_name: impl Into<String>,
    last_name: impl Into<String>,
    report_title: impl Into<String>,
  ) -> Self {
    Self {
      first_name:   first_name.into(),
      last_name:    last_name.into(),
      report_title: report_title.into(),
    }
  }
}

impl fmt::Display for ReportKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}: {}", self.first_name, self.last_name, self.report_title)
  }
}

// ─── Headers ─────────────────────────────────────────────────────────────────

/// A header exactly as a report source yields it. `date_filed` is still the
/// text shown on the search results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReportHeader {
  pub first_name:   String,
  pub last_name:    String,
  pub report_title: String,
  pub date_filed:   String,
  pub report_link:  String,
}

impl RawReportHeader {
  /// Parse the filing date, producing a header ready for insertion.
  pub fn into_new(self) -> Result<NewReportHeader> {
    let date_filed = parse_filing_date(&self.date_filed)?;
    Ok(NewReportHeader {
      first_name: self.first_name,
      last_name: self.last_name,
      report_title: self.report_title,
      date_filed,
      report_link: self.report_link,
    })
  }
}

/// Input to [`ReportStore::upsert_headers`](crate::store::ReportStore::upsert_headers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReportHeader {
  pub first_name:   String,
  pub last_name:    String,
  pub report_title: String,
  pub date_filed:   NaiveDate,
  pub report_link:  String,
}

impl NewReportHeader {
  pub fn key(&self) -> ReportKey {
    ReportKey::new(&self.first_name, &self.last_name, &self.report_title)
  }
}

/// A persisted header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportHeader {
  pub report_id:    ReportId,
  pub first_name:   String,
  pub last_name:    String,
  pub report_title: String,
  pub date_filed:   NaiveDate,
  pub report_link:  String,
}

impl ReportHeader {
  pub fn key(&self) -> ReportKey {
    ReportKey::new(&self.first_name, &self.last_name, &self.report_title)
  }
}

/// Parse a filing date as shown by the source (`MM/DD/YYYY`), also accepting
/// ISO `YYYY-MM-DD`.
pub fn parse_filing_date(s: &str) -> Result<NaiveDate> {
  let trimmed = s.trim();
  NaiveDate::parse_from_str(trimmed, "%m/%d/%Y")
    .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
    .map_err(|_| Error::InvalidFilingDate(s.to_owned()))
}

// ─── Transactions ────────────────────────────────────────────────────────────

/// One parsed trade, not yet stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
  pub report_id:        ReportId,
  /// 1-based position of the transaction within its report.
  pub transaction_id:   u32,
  pub transaction_date: String,
  pub owner:            String,
  pub security:         String,
  pub company:          String,
  pub security_type:    String,
  pub transaction_type: String,
  pub amount_range:     String,
  pub comment:          String,
}

/// A persisted trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
  pub master_transaction_id: i64,
  pub report_id:             ReportId,
  pub transaction_id:        u32,
  pub transaction_date:      String,
  pub owner:                 String,
  pub security:              String,
  pub company:               String,
  pub security_type:         String,
  pub transaction_type:      String,
  pub amount_range:          String,
  pub comment:               String,
}

/// One transaction with its header fields denormalised alongside; the row
/// shape of the flat export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRow {
  pub report_id:        ReportId,
  pub first_name:       String,
  pub last_name:        String,
  pub report_title:     String,
  pub date_filed:       NaiveDate,
  pub report_link:      String,
  pub transaction_id:   u32,
  pub transaction_date: String,
  pub owner:            String,
  pub security:         String,
  pub company:          String,
  pub security_type:    String,
  pub transaction_type: String,
  pub amount_range:     String,
  pub comment:          String,
}

// ─── Audit ───────────────────────────────────────────────────────────────────

/// Input to [`ReportStore::record_ignored`](crate::store::ReportStore::record_ignored):
/// a superseded identity and the scraped header that carried it, if the
/// batch contained one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIgnoredReport {
  pub key:         ReportKey,
  pub report_link: Option<String>,
  pub date_filed:  Option<NaiveDate>,
}

/// A logical identity excluded as superseded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredReport {
  pub run_id:      Uuid,
  pub key:         ReportKey,
  /// Link and filing date of the matching scraped header. `None` when the
  /// identity was only superseded, not present in the scrape.
  pub report_link: Option<String>,
  pub date_filed:  Option<NaiveDate>,
  pub recorded_at: DateTime<Utc>,
}

/// Counters reported by one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
  /// Headers returned by the source.
  pub headers_fetched:       usize,
  /// Headers whose filing date could not be parsed.
  pub invalid_headers:       usize,
  /// Repeated `report_link`s within the scrape.
  pub duplicate_headers:     usize,
  /// Headers dropped because a later amendment supersedes them.
  pub ignored_amendments:    usize,
  pub authoritative_reports: usize,
  pub reports_stored:        usize,
  /// Reports whose link was already stored with transactions.
  pub already_stored:        usize,
  /// Reports without a single complete transaction chunk.
  pub empty_reports:         usize,
  pub transactions_parsed:   usize,
  pub transactions_stored:   usize,
  pub rows_rejected:         usize,
  pub malformed_blocks:      usize,
  /// Headers deleted on the watermark date.
  pub cleared_headers:       usize,
  /// Headers deleted for having no transactions.
  pub pruned_headers:        usize,
  /// Previously stored headers deleted as superseded.
  pub retired_headers:       usize,
}

/// The audit record of a completed ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRun {
  pub run_id:      Uuid,
  pub started_at:  DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  /// The watermark: filings on or after this date were requested.
  pub since:       NaiveDate,
  pub counts:      RunCounts,
}
