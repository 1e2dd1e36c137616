//! Incremental watermark tracking.
//!
//! Reports filed on the most recent stored date may not all have been
//! published when the previous run scraped. Each run therefore deletes that
//! date's headers and re-requests every filing from that date on. Headers an
//! interrupted run left without transactions are pruned first, so they never
//! hold the watermark.
//!
//! A run that fails after clearing its date leaves that date pending in the
//! store; the next run resumes from it rather than stepping back another
//! day.

use chrono::NaiveDate;
use efd_core::store::ReportStore;
use tracing::{info, warn};

use crate::{Result, error::store_error};

/// Where the next scrape starts and what was removed to get there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
  /// Request filings with `date_filed >= since`.
  pub since:   NaiveDate,
  /// Headers deleted on the watermark date.
  pub cleared: usize,
  /// Headers deleted for having no transactions.
  pub pruned:  usize,
  /// True when `since` was left pending by an unfinished run.
  pub resumed: bool,
}

/// Prune stale headers, then clear the boundary date for re-scraping.
///
/// The boundary is persisted before anything on it is deleted. Until a run
/// is recorded as finished, later calls resume from that same date instead
/// of the latest remaining one, so repeating the call without an
/// intervening insert changes nothing further. Without a pending boundary
/// the latest filing date is used, falling back to `epoch` when the store
/// is empty or the date query fails.
pub async fn advance_watermark<S: ReportStore>(store: &S, epoch: NaiveDate) -> Result<Watermark> {
  let pruned = store.prune_pending_headers().await.map_err(store_error)?;
  if pruned > 0 {
    warn!(pruned, "removed headers left without transactions by an earlier run");
  }

  if let Some(since) = store.pending_watermark().await.map_err(store_error)? {
    let cleared = store.delete_headers_on_date(since).await.map_err(store_error)?;
    info!(%since, cleared, "resuming watermark of an unfinished run");
    return Ok(Watermark { since, cleared, pruned, resumed: true });
  }

  let latest = match store.latest_filing_date().await {
    Ok(Some(date)) => date,
    Ok(None) => {
      info!(%epoch, "store holds no filings, starting from epoch");
      return Ok(Watermark { since: epoch, cleared: 0, pruned, resumed: false });
    }
    Err(e) => {
      warn!(error = %e, %epoch, "watermark query failed, starting from epoch");
      return Ok(Watermark { since: epoch, cleared: 0, pruned, resumed: false });
    }
  };

  let cleared = store.begin_watermark(latest).await.map_err(store_error)?;
  info!(since = %latest, cleared, "cleared watermark date for re-scrape");

  Ok(Watermark { since: latest, cleared, pruned, resumed: false })
}
