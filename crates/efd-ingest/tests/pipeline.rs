//! End-to-end ingestion runs against an in-memory SQLite store.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::Mutex,
};

use chrono::NaiveDate;
use efd_core::{
  report::{NewReportHeader, RawReportHeader, ReportKey},
  store::{ReportStore, StoreDump},
};
use efd_ingest::{
  Error, FixtureBundle, FixtureSource, IngestConfig, ReportSource, SourceError,
  advance_watermark, ingest,
};
use efd_store_sqlite::SqliteStore;

// ─── Fixtures ────────────────────────────────────────────────────────────────

const TITLE: &str = "Periodic Transaction Report for 01/02/2020";

fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn raw(last: &str, title: &str, filed: &str) -> RawReportHeader {
  RawReportHeader {
    first_name:   "Pat".into(),
    last_name:    last.into(),
    report_title: title.into(),
    date_filed:   filed.into(),
    report_link:  link(last, title),
  }
}

fn link(last: &str, title: &str) -> String {
  format!("https://example.test/ptr/{last}/{}", title.replace(' ', "-"))
}

/// `rows` complete transaction rows worth of table cells.
fn cells(rows: usize) -> Vec<String> {
  (1..=rows)
    .flat_map(|n| {
      [
        n.to_string(),
        "01/02/2020".into(),
        "Self".into(),
        "MSFT".into(),
        "Microsoft\nCorporation".into(),
        "Stock".into(),
        "Purchase".into(),
        "$1,001 - $15,000".into(),
        "--".into(),
      ]
    })
    .collect()
}

/// Builds a bundle where every header's link resolves to `rows` rows.
fn bundle(headers: Vec<RawReportHeader>, rows: usize) -> FixtureBundle {
  let transactions = headers
    .iter()
    .map(|h| (h.report_link.clone(), cells(rows)))
    .collect();
  FixtureBundle { headers, transactions }
}

/// A fixture source that records every `since` and every transaction table
/// it is asked for.
struct RecordingSource {
  inner:        FixtureSource,
  /// Return every header regardless of `since`, like a scraper that cannot
  /// filter by date.
  ignore_since: bool,
  requested:    Mutex<Vec<NaiveDate>>,
  fetched:      Mutex<Vec<String>>,
}

impl RecordingSource {
  fn new(bundle: FixtureBundle) -> Self {
    Self {
      inner:        FixtureSource::new(bundle),
      ignore_since: false,
      requested:    Mutex::new(Vec::new()),
      fetched:      Mutex::new(Vec::new()),
    }
  }

  fn ignoring_since(bundle: FixtureBundle) -> Self {
    Self { ignore_since: true, ..Self::new(bundle) }
  }

  fn requested(&self) -> Vec<NaiveDate> { self.requested.lock().unwrap().clone() }

  fn fetched(&self) -> Vec<String> { self.fetched.lock().unwrap().clone() }
}

impl ReportSource for RecordingSource {
  async fn fetch_headers(&self, since: NaiveDate) -> Result<Vec<RawReportHeader>, SourceError> {
    self.requested.lock().unwrap().push(since);
    let since = if self.ignore_since { NaiveDate::MIN } else { since };
    self.inner.fetch_headers(since).await
  }

  async fn fetch_transaction_cells<'a>(
    &'a self,
    report_link: &'a str,
  ) -> Result<Vec<String>, SourceError> {
    self.fetched.lock().unwrap().push(report_link.to_owned());
    self.inner.fetch_transaction_cells(report_link).await
  }
}

type Content = (BTreeSet<(String, String, NaiveDate, String)>, Vec<(String, u32, String)>);

/// Store contents with surrogate ids stripped, for comparing runs.
fn content(dump: &StoreDump) -> Content {
  let headers = dump
    .headers
    .iter()
    .map(|h| {
      (
        h.last_name.clone(),
        h.report_title.clone(),
        h.date_filed,
        h.report_link.clone(),
      )
    })
    .collect();
  let mut trades: Vec<_> = dump
    .trades
    .iter()
    .map(|t| (t.report_link.clone(), t.transaction_id, t.company.clone()))
    .collect();
  trades.sort();
  (headers, trades)
}

fn titles(dump: &StoreDump) -> BTreeSet<String> {
  dump.headers.iter().map(|h| h.report_title.clone()).collect()
}

// ─── Watermark ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_store_scrapes_from_epoch() {
  let s = store().await;
  let source = RecordingSource::new(FixtureBundle::default());

  let run = ingest(&s, &source, &IngestConfig::default()).await.unwrap();

  assert_eq!(source.requested(), vec![date(2012, 1, 1)]);
  assert_eq!(run.since, date(2012, 1, 1));
  assert_eq!(run.counts.headers_fetched, 0);
}

#[tokio::test]
async fn watermark_clears_the_latest_date() {
  let s = store().await;
  let source = FixtureSource::new(bundle(
    vec![
      raw("Lee", TITLE, "01/10/2020"),
      raw("Kim", TITLE, "01/12/2020"),
      raw("Ray", TITLE, "01/12/2020"),
    ],
    1,
  ));
  ingest(&s, &source, &IngestConfig::default()).await.unwrap();

  let mark = advance_watermark(&s, date(2012, 1, 1)).await.unwrap();
  assert_eq!(mark.since, date(2020, 1, 12));
  assert_eq!(mark.cleared, 2);
  assert_eq!(mark.pruned, 0);

  let dump = s.full_dump().await.unwrap();
  assert_eq!(dump.headers.len(), 1);
  assert_eq!(dump.headers[0].last_name, "Lee");
}

#[tokio::test]
async fn advancing_twice_leaves_the_store_unchanged() {
  let s = store().await;
  let source = FixtureSource::new(bundle(
    vec![raw("Lee", TITLE, "01/10/2020"), raw("Kim", TITLE, "01/12/2020")],
    1,
  ));
  ingest(&s, &source, &IngestConfig::default()).await.unwrap();

  let first = advance_watermark(&s, date(2012, 1, 1)).await.unwrap();
  let after_first = content(&s.full_dump().await.unwrap());
  let second = advance_watermark(&s, date(2012, 1, 1)).await.unwrap();
  let after_second = content(&s.full_dump().await.unwrap());

  assert_eq!(first.since, date(2020, 1, 12));
  assert_eq!(first.cleared, 1);
  assert!(!first.resumed);
  assert_eq!(second.since, first.since);
  assert_eq!(second.cleared, 0);
  assert!(second.resumed);
  assert_eq!(after_first, after_second);
  assert_eq!(after_second.0.len(), 1);
}

#[tokio::test]
async fn failed_retries_keep_the_same_watermark() {
  let s = store().await;
  let full = bundle(
    vec![raw("Lee", TITLE, "01/10/2020"), raw("Kim", TITLE, "01/12/2020")],
    1,
  );
  ingest(&s, &FixtureSource::new(full.clone()), &IngestConfig::default())
    .await
    .unwrap();

  let mut broken = full.clone();
  broken.transactions.remove(&link("Kim", TITLE));
  let source = RecordingSource::new(broken);
  for _ in 0..3 {
    assert!(ingest(&s, &source, &IngestConfig::default()).await.is_err());
  }
  assert_eq!(source.requested(), vec![date(2020, 1, 12); 3]);

  let dump = s.full_dump().await.unwrap();
  assert_eq!(dump.headers.len(), 1);
  assert_eq!(dump.headers[0].last_name, "Lee");

  let run = ingest(&s, &FixtureSource::new(full), &IngestConfig::default())
    .await
    .unwrap();
  assert_eq!(run.since, date(2020, 1, 12));
  assert_eq!(s.full_dump().await.unwrap().headers.len(), 2);
  assert_eq!(s.pending_watermark().await.unwrap(), None);
}

#[tokio::test]
async fn interrupted_run_is_recovered() {
  let s = store().await;
  let source = FixtureSource::new(bundle(
    vec![raw("Lee", TITLE, "01/10/2020"), raw("Kim", TITLE, "01/12/2020")],
    2,
  ));
  ingest(&s, &source, &IngestConfig::default()).await.unwrap();

  // A later header stored without its transactions, as a crash would leave it.
  s.upsert_headers(vec![NewReportHeader {
    first_name:   "Pat".into(),
    last_name:    "Ray".into(),
    report_title: TITLE.into(),
    date_filed:   date(2020, 1, 14),
    report_link:  link("Ray", TITLE),
  }])
  .await
  .unwrap();

  let source = RecordingSource::new(bundle(
    vec![
      raw("Lee", TITLE, "01/10/2020"),
      raw("Kim", TITLE, "01/12/2020"),
      raw("Ray", TITLE, "01/14/2020"),
    ],
    2,
  ));
  let run = ingest(&s, &source, &IngestConfig::default()).await.unwrap();

  assert_eq!(run.counts.pruned_headers, 1);
  assert_eq!(source.requested(), vec![date(2020, 1, 12)]);

  let dump = s.full_dump().await.unwrap();
  assert_eq!(dump.headers.len(), 3);
  assert_eq!(dump.transactions.len(), 6);
}

// ─── Idempotence ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn rerun_without_new_data_changes_nothing() {
  let s = store().await;
  let source = FixtureSource::new(bundle(
    vec![
      raw("Lee", TITLE, "01/10/2020"),
      raw("Kim", TITLE, "01/12/2020"),
    ],
    3,
  ));
  let config = IngestConfig::default();

  let first = ingest(&s, &source, &config).await.unwrap();
  let after_first = content(&s.full_dump().await.unwrap());
  let second = ingest(&s, &source, &config).await.unwrap();
  let after_second = content(&s.full_dump().await.unwrap());

  assert_eq!(after_first, after_second);
  assert_eq!(after_second.0.len(), 2);
  assert_eq!(after_second.1.len(), 6);

  assert_eq!(first.counts.reports_stored, 2);
  assert_eq!(second.since, date(2020, 1, 12));
  assert_eq!(second.counts.cleared_headers, 1);
  assert_eq!(second.counts.reports_stored, 1);
  assert_eq!(s.full_dump().await.unwrap().runs.len(), 2);
}

#[tokio::test]
async fn stored_reports_are_not_fetched_again() {
  let s = store().await;
  let b = bundle(
    vec![raw("Lee", TITLE, "01/10/2020"), raw("Kim", TITLE, "01/12/2020")],
    2,
  );
  ingest(&s, &FixtureSource::new(b.clone()), &IngestConfig::default())
    .await
    .unwrap();

  let source = RecordingSource::ignoring_since(b);
  let run = ingest(&s, &source, &IngestConfig::default()).await.unwrap();

  // Lee is still stored with transactions; only the cleared date is fetched.
  assert_eq!(source.fetched(), vec![link("Kim", TITLE)]);
  assert_eq!(run.counts.already_stored, 1);
  assert_eq!(run.counts.reports_stored, 1);
  assert_eq!(s.full_dump().await.unwrap().transactions.len(), 4);
}

#[tokio::test]
async fn duplicate_links_in_one_scrape_are_stored_once() {
  let s = store().await;
  let mut b = bundle(vec![raw("Lee", TITLE, "01/10/2020")], 1);
  b.headers.push(raw("Lee", TITLE, "01/10/2020"));
  let source = FixtureSource::new(b);

  let run = ingest(&s, &source, &IngestConfig::default()).await.unwrap();

  assert_eq!(run.counts.duplicate_headers, 1);
  let dump = s.full_dump().await.unwrap();
  assert_eq!(dump.headers.len(), 1);
  assert_eq!(dump.transactions.len(), 1);
}

// ─── Amendments ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn amendment_in_the_same_scrape_excludes_the_original() {
  let s = store().await;
  let amended = format!("{TITLE} (Amendment 1)");
  let source = FixtureSource::new(bundle(
    vec![
      raw("Lee", TITLE, "01/10/2020"),
      raw("Lee", &amended, "01/11/2020"),
      raw("Kim", TITLE, "01/11/2020"),
    ],
    1,
  ));

  let run = ingest(&s, &source, &IngestConfig::default()).await.unwrap();
  assert_eq!(run.counts.ignored_amendments, 1);
  assert_eq!(run.counts.authoritative_reports, 2);

  let dump = s.full_dump().await.unwrap();
  let stored: BTreeSet<_> = dump
    .headers
    .iter()
    .map(|h| (h.last_name.as_str(), h.report_title.as_str()))
    .collect();
  assert_eq!(
    stored,
    BTreeSet::from([("Lee", amended.as_str()), ("Kim", TITLE)])
  );
  assert_eq!(dump.ignored.len(), 1);
  assert_eq!(dump.ignored[0].key, ReportKey::new("Pat", "Lee", TITLE));
  assert_eq!(dump.ignored[0].run_id, run.run_id);
  assert_eq!(dump.ignored[0].report_link, Some(link("Lee", TITLE)));
  assert_eq!(dump.ignored[0].date_filed, Some(date(2020, 1, 10)));
}

#[tokio::test]
async fn later_amendment_retires_the_stored_original() {
  let s = store().await;
  let config = IngestConfig::default();
  ingest(
    &s,
    &FixtureSource::new(bundle(
      vec![raw("Lee", TITLE, "01/10/2020"), raw("Kim", TITLE, "01/12/2020")],
      1,
    )),
    &config,
  )
  .await
  .unwrap();

  let amended = format!("{TITLE} (Amendment 2)");
  let run = ingest(
    &s,
    &FixtureSource::new(bundle(
      vec![
        raw("Lee", TITLE, "01/10/2020"),
        raw("Kim", TITLE, "01/12/2020"),
        raw("Lee", &amended, "01/15/2020"),
      ],
      1,
    )),
    &config,
  )
  .await
  .unwrap();

  assert_eq!(run.counts.retired_headers, 1);
  let dump = s.full_dump().await.unwrap();
  assert_eq!(titles(&dump), BTreeSet::from([TITLE.to_owned(), amended]));
  assert!(
    dump
      .headers
      .iter()
      .all(|h| h.last_name != "Lee" || h.report_title != TITLE)
  );
  assert_eq!(dump.transactions.len(), 2);
  assert_eq!(dump.ignored.len(), 2);
}

#[tokio::test]
async fn retirement_can_be_disabled() {
  let s = store().await;
  let config = IngestConfig {
    retire_superseded: false,
    ..IngestConfig::default()
  };
  ingest(
    &s,
    &FixtureSource::new(bundle(
      vec![raw("Lee", TITLE, "01/10/2020"), raw("Kim", TITLE, "01/12/2020")],
      1,
    )),
    &config,
  )
  .await
  .unwrap();

  let amended = format!("{TITLE} (Amendment 1)");
  let run = ingest(
    &s,
    &FixtureSource::new(bundle(
      vec![raw("Kim", TITLE, "01/12/2020"), raw("Lee", &amended, "01/15/2020")],
      1,
    )),
    &config,
  )
  .await
  .unwrap();

  assert_eq!(run.counts.retired_headers, 0);
  assert_eq!(s.full_dump().await.unwrap().headers.len(), 3);
}

// ─── Failures & malformed input ──────────────────────────────────────────────

#[tokio::test]
async fn fetch_failure_stores_no_headers() {
  let s = store().await;
  let mut b = bundle(
    vec![raw("Lee", TITLE, "01/10/2020"), raw("Kim", TITLE, "01/12/2020")],
    1,
  );
  b.transactions.remove(&link("Kim", TITLE));
  let source = FixtureSource::new(b);

  let err = ingest(&s, &source, &IngestConfig::default())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Source(SourceError::MissingReport(_))));

  let dump = s.full_dump().await.unwrap();
  assert!(dump.headers.is_empty());
  assert!(dump.runs.is_empty());
}

#[tokio::test]
async fn partial_trailing_row_is_dropped_and_counted() {
  let s = store().await;
  let mut partial = cells(3);
  partial.extend(["4".to_owned(), "01/03/2020".to_owned()]);
  let source = FixtureSource::new(FixtureBundle {
    headers:      vec![raw("Lee", TITLE, "01/10/2020")],
    transactions: BTreeMap::from([(link("Lee", TITLE), partial)]),
  });

  let run = ingest(&s, &source, &IngestConfig::default()).await.unwrap();
  assert_eq!(run.counts.malformed_blocks, 1);
  assert_eq!(run.counts.transactions_parsed, 3);
  assert_eq!(run.counts.transactions_stored, 3);

  let dump = s.full_dump().await.unwrap();
  let ids: Vec<_> = dump.trades.iter().map(|t| t.transaction_id).collect();
  assert_eq!(ids, vec![1, 2, 3]);
  assert_eq!(dump.trades[0].company, "Microsoft Corporation");
  assert_eq!(dump.trades[0].security, "MSFT");
}

#[tokio::test]
async fn invalid_filing_dates_are_rejected_and_counted() {
  let s = store().await;
  let source = FixtureSource::new(bundle(
    vec![raw("Lee", TITLE, "01/10/2020"), raw("Kim", TITLE, "sometime")],
    1,
  ));

  let run = ingest(&s, &source, &IngestConfig::default()).await.unwrap();
  assert_eq!(run.counts.headers_fetched, 2);
  assert_eq!(run.counts.invalid_headers, 1);

  let dump = s.full_dump().await.unwrap();
  assert_eq!(dump.headers.len(), 1);
  assert_eq!(dump.headers[0].last_name, "Lee");
}

#[tokio::test]
async fn reports_without_a_complete_row_are_not_stored() {
  let s = store().await;
  let source = FixtureSource::new(FixtureBundle {
    headers:      vec![raw("Lee", TITLE, "01/10/2020")],
    transactions: BTreeMap::from([(link("Lee", TITLE), vec!["1".to_owned()])]),
  });

  let run = ingest(&s, &source, &IngestConfig::default()).await.unwrap();
  assert_eq!(run.counts.empty_reports, 1);
  assert_eq!(run.counts.reports_stored, 0);
  assert!(s.full_dump().await.unwrap().headers.is_empty());
}
