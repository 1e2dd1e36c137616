//! Pipeline configuration.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The watermark used when the store holds no filings.
pub fn default_epoch() -> NaiveDate {
  NaiveDate::from_ymd_opt(2012, 1, 1).expect("2012-01-01 is a valid date")
}

/// Settings passed explicitly into [`ingest`](crate::ingest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
  /// Start date requested from the source when the store is empty.
  pub epoch:             NaiveDate,
  /// Delete stored headers superseded by an amendment scraped in a later
  /// run.
  pub retire_superseded: bool,
}

impl Default for IngestConfig {
  fn default() -> Self {
    Self {
      epoch:             default_epoch(),
      retire_superseded: true,
    }
  }
}
