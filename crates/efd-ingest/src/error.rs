//! Error types for `efd-ingest`.

use efd_core::store::StoreError;
use thiserror::Error;

/// Failure of the report source. Aborts the run it occurs in.
#[derive(Debug, Error)]
pub enum SourceError {
  #[error("fetch failed for {target}: {reason}")]
  Fetch { target: String, reason: String },

  #[error("no transaction table for {0}")]
  MissingReport(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("fetch failure: {0}")]
  Source(#[from] SourceError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Box a backend error into [`Error::Store`].
pub fn store_error<E: StoreError>(e: E) -> Error { Error::Store(Box::new(e)) }

pub type Result<T, E = Error> = std::result::Result<T, E>;
