//! The report source: the scraper the pipeline pulls raw data from.
//!
//! How a source obtains its data (browser automation, pagination, rate
//! limiting) is entirely its own concern. The pipeline only sees header
//! tuples and flat lists of transaction table cells.

use std::{collections::BTreeMap, future::Future, path::Path};

use chrono::NaiveDate;
use efd_core::report::{RawReportHeader, parse_filing_date};
use serde::{Deserialize, Serialize};

use crate::SourceError;

/// A source of raw report data.
pub trait ReportSource: Send + Sync {
  /// All report headers filed on or after `since`.
  fn fetch_headers(
    &self,
    since: NaiveDate,
  ) -> impl Future<Output = Result<Vec<RawReportHeader>, SourceError>> + Send + '_;

  /// The text of every cell of the transaction table behind `report_link`,
  /// in reading order.
  fn fetch_transaction_cells<'a>(
    &'a self,
    report_link: &'a str,
  ) -> impl Future<Output = Result<Vec<String>, SourceError>> + Send + 'a;
}

// ─── Fixture source ──────────────────────────────────────────────────────────

/// A captured scrape: header tuples plus the transaction cells of each
/// report, keyed by `report_link`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureBundle {
  pub headers:      Vec<RawReportHeader>,
  #[serde(default)]
  pub transactions: BTreeMap<String, Vec<String>>,
}

/// A [`ReportSource`] replaying a [`FixtureBundle`].
#[derive(Debug, Clone, Default)]
pub struct FixtureSource {
  bundle: FixtureBundle,
}

impl FixtureSource {
  pub fn new(bundle: FixtureBundle) -> Self { Self { bundle } }

  /// Read a JSON-encoded [`FixtureBundle`] from `path`.
  pub async fn load(path: impl AsRef<Path>) -> Result<Self, SourceError> {
    let data = tokio::fs::read_to_string(path.as_ref()).await?;
    Ok(Self::new(serde_json::from_str(&data)?))
  }
}

impl ReportSource for FixtureSource {
  async fn fetch_headers(&self, since: NaiveDate) -> Result<Vec<RawReportHeader>, SourceError> {
    // Unparseable dates pass through; rejecting them is the pipeline's job.
    Ok(
      self
        .bundle
        .headers
        .iter()
        .filter(|h| parse_filing_date(&h.date_filed).map_or(true, |d| d >= since))
        .cloned()
        .collect(),
    )
  }

  async fn fetch_transaction_cells<'a>(
    &'a self,
    report_link: &'a str,
  ) -> Result<Vec<String>, SourceError> {
    self
      .bundle
      .transactions
      .get(report_link)
      .cloned()
      .ok_or_else(|| SourceError::MissingReport(report_link.to_owned()))
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use super::*;

  fn raw(link: &str, filed: &str) -> RawReportHeader {
    RawReportHeader {
      first_name:   "Jo".into(),
      last_name:    "Park".into(),
      report_title: "Periodic Transaction Report for 01/02/2020".into(),
      date_filed:   filed.into(),
      report_link:  link.into(),
    }
  }

  #[tokio::test]
  async fn headers_are_filtered_by_since() {
    let source = FixtureSource::new(FixtureBundle {
      headers:      vec![
        raw("a", "01/01/2020"),
        raw("b", "01/05/2020"),
        raw("c", "not a date"),
      ],
      transactions: BTreeMap::new(),
    });

    let since = NaiveDate::from_ymd_opt(2020, 1, 5).unwrap();
    let links: Vec<_> = source
      .fetch_headers(since)
      .await
      .unwrap()
      .into_iter()
      .map(|h| h.report_link)
      .collect();
    assert_eq!(links, vec!["b", "c"]);
  }

  #[tokio::test]
  async fn unknown_link_is_a_missing_report() {
    let source = FixtureSource::default();
    let err = source.fetch_transaction_cells("nowhere").await.unwrap_err();
    assert!(matches!(err, SourceError::MissingReport(link) if link == "nowhere"));
  }

  #[tokio::test]
  async fn bundle_loads_from_json() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      r#"{{
        "headers": [{{
          "first_name": "Jo", "last_name": "Park",
          "report_title": "Periodic Transaction Report for 01/02/2020",
          "date_filed": "01/10/2020", "report_link": "https://example.test/1"
        }}],
        "transactions": {{ "https://example.test/1": ["1", "01/02/2020"] }}
      }}"#
    )
    .unwrap();

    let source = FixtureSource::load(file.path()).await.unwrap();
    let cells = source
      .fetch_transaction_cells("https://example.test/1")
      .await
      .unwrap();
    assert_eq!(cells, vec!["1", "01/02/2020"]);
  }
}
