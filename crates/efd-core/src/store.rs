//! The `ReportStore` trait: the reconciling store of headers and
//! transactions.
//!
//! The trait is implemented by storage backends (e.g. `efd-store-sqlite`).
//! The ingestion pipeline depends on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::report::{
  IgnoredReport, IngestRun, NewIgnoredReport, NewReportHeader, NewTransaction,
  ReportHeader, ReportId, ReportKey, TradeRow, Transaction,
};

// ─── Dump ────────────────────────────────────────────────────────────────────

/// Everything a store holds, for external consumption.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDump {
  pub headers:      Vec<ReportHeader>,
  pub transactions: Vec<Transaction>,
  /// Header ⋈ transactions, one row per transaction.
  pub trades:       Vec<TradeRow>,
  pub ignored:      Vec<IgnoredReport>,
  pub runs:         Vec<IngestRun>,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Error bound for store backends.
///
/// Backends wrap [`crate::Error`] for the failures the pipeline reacts to
/// (e.g. [`crate::Error::ReferentialIntegrityViolation`]); `as_core` exposes
/// it without knowing the backend's own error type.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn as_core(&self) -> Option<&crate::Error>;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a report store backend.
///
/// Headers are never updated in place. Every multi-row mutation is atomic:
/// it either applies completely or not at all.
///
/// The store does not resolve amendments itself; callers filter superseded
/// headers out before calling [`ReportStore::upsert_headers`].
pub trait ReportStore: Send + Sync {
  type Error: StoreError;

  // ── Headers ───────────────────────────────────────────────────────────

  /// Append headers, assigning each a fresh `report_id`.
  ///
  /// A header whose `report_link` is already stored is not inserted again;
  /// the stored row is returned in its place. Output order matches input.
  fn upsert_headers(
    &self,
    headers: Vec<NewReportHeader>,
  ) -> impl Future<Output = Result<Vec<ReportHeader>, Self::Error>> + Send + '_;

  /// The stored headers among `links`. Unknown links are skipped.
  fn find_by_links(
    &self,
    links: Vec<String>,
  ) -> impl Future<Output = Result<Vec<ReportHeader>, Self::Error>> + Send + '_;

  /// True when the header has no transactions yet.
  ///
  /// Fails with [`crate::Error::HeaderNotFound`] for an unknown id.
  fn transactions_pending(
    &self,
    report_id: ReportId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Transactions ──────────────────────────────────────────────────────

  /// Append transaction rows and return how many were written.
  ///
  /// If any row references a missing header the whole call fails with
  /// [`crate::Error::ReferentialIntegrityViolation`] and nothing is written.
  fn append_transactions(
    &self,
    rows: Vec<NewTransaction>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Watermark support ─────────────────────────────────────────────────

  /// The most recent `date_filed` of any stored header.
  fn latest_filing_date(
    &self,
  ) -> impl Future<Output = Result<Option<NaiveDate>, Self::Error>> + Send + '_;

  /// Delete every header filed on `date`, with its transactions. Returns the
  /// number of headers deleted; repeating the call deletes nothing.
  fn delete_headers_on_date(
    &self,
    date: NaiveDate,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// The watermark of a run that cleared its boundary date but has not been
  /// recorded as finished.
  fn pending_watermark(
    &self,
  ) -> impl Future<Output = Result<Option<NaiveDate>, Self::Error>> + Send + '_;

  /// Persist `date` as the pending watermark and delete every header filed
  /// on it, in one atomic step. Returns the number of headers deleted.
  ///
  /// The pending watermark stays set until [`ReportStore::record_run`]
  /// records a finished run.
  fn begin_watermark(
    &self,
    date: NaiveDate,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Delete every header that has no transactions.
  fn prune_pending_headers(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Delete headers whose logical identity appears in `keys`, with their
  /// transactions.
  fn delete_superseded<'a>(
    &'a self,
    keys: &'a [ReportKey],
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  // ── Audit ─────────────────────────────────────────────────────────────

  /// Durably record the identities excluded as superseded in a run, with
  /// the scraped headers that matched them.
  fn record_ignored(
    &self,
    run_id: Uuid,
    entries: Vec<NewIgnoredReport>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Durably record a finished run and clear the pending watermark.
  fn record_run(
    &self,
    run: IngestRun,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Every table, plus the joined header/transaction view.
  fn full_dump(&self) -> impl Future<Output = Result<StoreDump, Self::Error>> + Send + '_;
}
