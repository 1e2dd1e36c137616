//! The ingestion pipeline.
//!
//! Stages run strictly in sequence against a single store. Nothing is
//! written until every authoritative report's transaction cells have been
//! fetched; a source failure before that point aborts the run with the store
//! untouched apart from the watermark clearing, whose date stays pending so
//! a retry clears nothing further.
//!
//! Reports already stored with their transactions are not fetched again.
//!
//! Reports are committed in ascending `date_filed` order, one header and its
//! transactions at a time. If the process dies mid-commit, at most one header
//! is left without transactions and its date is not earlier than any
//! committed report, so the next run's watermark covers it again.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use efd_core::{
  Error as CoreError,
  amendment::resolve_amendments,
  report::{IngestRun, NewReportHeader, RawReportHeader, ReportHeader, ReportKey, RunCounts},
  store::{ReportStore, StoreError as _},
  transaction::{FIELDS_PER_TRANSACTION, parse_transactions},
};
use tracing::{Instrument as _, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
  Error, IngestConfig, Result, advance_watermark, error::store_error, source::ReportSource,
};

/// Run one ingestion pass and return its audit record, which is also stored.
pub async fn ingest<S, F>(store: &S, source: &F, config: &IngestConfig) -> Result<IngestRun>
where
  S: ReportStore,
  F: ReportSource,
{
  let run_id = Uuid::new_v4();
  run(store, source, config, run_id)
    .instrument(info_span!("ingest", %run_id))
    .await
}

async fn run<S, F>(store: &S, source: &F, config: &IngestConfig, run_id: Uuid) -> Result<IngestRun>
where
  S: ReportStore,
  F: ReportSource,
{
  let started_at = Utc::now();
  let mut counts = RunCounts::default();

  let watermark = advance_watermark(store, config.epoch).await?;
  counts.cleared_headers = watermark.cleared;
  counts.pruned_headers = watermark.pruned;

  let raw = source.fetch_headers(watermark.since).await?;
  counts.headers_fetched = raw.len();
  info!(since = %watermark.since, fetched = raw.len(), "fetched report headers");

  let headers = prepare_headers(raw, &mut counts);

  let resolution = resolve_amendments(headers);
  for key in &resolution.inferred {
    debug!(report = %key, "amendment without version digit, assuming version 1");
  }
  for h in &resolution.ignored {
    info!(report = %h.key(), link = %h.report_link, "ignoring superseded report");
  }
  counts.ignored_amendments = resolution.ignored.len();
  counts.authoritative_reports = resolution.authoritative.len();

  let audit = resolution.audit_entries();
  let mut authoritative = resolution.authoritative;
  authoritative.sort_by_key(|h| h.date_filed);
  let pending = select_pending(store, authoritative, &mut counts).await?;
  let reports = fetch_reports(source, pending).await?;

  let exclusions: Vec<ReportKey> = resolution.exclusions.into_iter().collect();
  if !exclusions.is_empty() {
    store.record_ignored(run_id, audit).await.map_err(store_error)?;

    if config.retire_superseded {
      counts.retired_headers = store
        .delete_superseded(&exclusions)
        .await
        .map_err(store_error)?;
      if counts.retired_headers > 0 {
        info!(retired = counts.retired_headers, "retired stored reports superseded by amendments");
      }
    }
  }

  for (header, cells) in reports {
    commit_report(store, header, &cells, &mut counts).await?;
  }

  let run = IngestRun {
    run_id,
    started_at,
    finished_at: Utc::now(),
    since: watermark.since,
    counts,
  };
  store.record_run(run.clone()).await.map_err(store_error)?;

  info!(
    fetched = counts.headers_fetched,
    ignored = counts.ignored_amendments,
    stored = counts.reports_stored,
    transactions = counts.transactions_stored,
    rejected = counts.rows_rejected,
    malformed = counts.malformed_blocks,
    "ingest complete"
  );
  Ok(run)
}

/// Parse filing dates and drop repeated links, keeping the first occurrence.
fn prepare_headers(raw: Vec<RawReportHeader>, counts: &mut RunCounts) -> Vec<NewReportHeader> {
  let mut seen = HashSet::new();
  let mut headers = Vec::with_capacity(raw.len());

  for r in raw {
    let link = r.report_link.clone();
    let header = match r.into_new() {
      Ok(h) => h,
      Err(e) => {
        counts.invalid_headers += 1;
        warn!(%link, error = %e, "rejecting report header");
        continue;
      }
    };
    if !seen.insert(link) {
      counts.duplicate_headers += 1;
      debug!(link = %header.report_link, "duplicate report link in scrape");
      continue;
    }
    headers.push(header);
  }

  headers
}

/// Drop reports already stored with their transactions; only the rest need
/// their transaction tables fetched.
async fn select_pending<S: ReportStore>(
  store: &S,
  headers: Vec<NewReportHeader>,
  counts: &mut RunCounts,
) -> Result<Vec<NewReportHeader>> {
  let links = headers.iter().map(|h| h.report_link.clone()).collect();
  let stored: HashMap<String, ReportHeader> = store
    .find_by_links(links)
    .await
    .map_err(store_error)?
    .into_iter()
    .map(|h| (h.report_link.clone(), h))
    .collect();

  let mut pending = Vec::with_capacity(headers.len());
  for header in headers {
    if let Some(existing) = stored.get(&header.report_link) {
      let needs_rows = store
        .transactions_pending(existing.report_id)
        .await
        .map_err(store_error)?;
      if !needs_rows {
        counts.already_stored += 1;
        debug!(report_id = existing.report_id, "report already stored, not fetching");
        continue;
      }
    }
    pending.push(header);
  }
  Ok(pending)
}

/// Fetch the transaction cells of every report. The first failure aborts.
async fn fetch_reports<F: ReportSource>(
  source: &F,
  headers: Vec<NewReportHeader>,
) -> Result<Vec<(NewReportHeader, Vec<String>)>> {
  let mut reports = Vec::with_capacity(headers.len());
  for header in headers {
    let cells = match source.fetch_transaction_cells(&header.report_link).await {
      Ok(cells) => cells,
      Err(e) => {
        warn!(link = %header.report_link, error = %e, "transaction fetch failed, aborting run");
        return Err(e.into());
      }
    };
    reports.push((header, cells));
  }
  Ok(reports)
}

/// Store one report and its transactions.
async fn commit_report<S: ReportStore>(
  store: &S,
  header: NewReportHeader,
  cells: &[String],
  counts: &mut RunCounts,
) -> Result<()> {
  if cells.len() < FIELDS_PER_TRANSACTION {
    counts.empty_reports += 1;
    warn!(
      link = %header.report_link,
      cells = cells.len(),
      "report has no complete transaction, not stored"
    );
    return Ok(());
  }

  let Some(stored) = store
    .upsert_headers(vec![header])
    .await
    .map_err(store_error)?
    .pop()
  else {
    return Err(Error::Store("store returned no row for an inserted header".into()));
  };

  let pending = store
    .transactions_pending(stored.report_id)
    .await
    .map_err(store_error)?;
  if !pending {
    counts.already_stored += 1;
    debug!(report_id = stored.report_id, "report already stored");
    return Ok(());
  }

  let rows = parse_transactions(stored.report_id, cells);
  if let Some(e) = rows.malformed() {
    counts.malformed_blocks += 1;
    warn!(
      report_id = stored.report_id,
      link = %stored.report_link,
      dropped = rows.dropped_cells(),
      error = %e,
      "dropping partial transaction row"
    );
  }
  let rows: Vec<_> = rows.collect();
  counts.transactions_parsed += rows.len();

  match store.append_transactions(rows).await {
    Ok(written) => {
      counts.transactions_stored += written;
      counts.reports_stored += 1;
      Ok(())
    }
    Err(e) => {
      let rejected = match e.as_core() {
        Some(CoreError::ReferentialIntegrityViolation { rejected, .. }) => Some(*rejected),
        _ => None,
      };
      let Some(rejected) = rejected else {
        return Err(store_error(e));
      };
      counts.rows_rejected += rejected;
      warn!(report_id = stored.report_id, rejected, error = %e, "transactions rejected");
      Ok(())
    }
  }
}
