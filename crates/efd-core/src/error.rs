//! Error types for `efd-core`.

use thiserror::Error;

use crate::report::ReportId;

#[derive(Debug, Error)]
pub enum Error {
  /// A transaction cell block whose length is not a multiple of the field
  /// width. The trailing partial chunk is dropped by the parser.
  #[error("malformed transaction block: {cells} cells is not a multiple of {width}")]
  MalformedTransactionBlock { cells: usize, width: usize },

  #[error("invalid filing date {0:?}")]
  InvalidFilingDate(String),

  /// Transactions referencing headers that do not exist. Nothing from the
  /// offending batch was written.
  #[error(
    "referential integrity violation: headers {missing:?} do not exist, {rejected} rows rejected"
  )]
  ReferentialIntegrityViolation {
    missing:  Vec<ReportId>,
    rejected: usize,
  },

  #[error("report header not found: {0}")]
  HeaderNotFound(ReportId),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
