//! Incremental ingestion of periodic transaction reports.
//!
//! Composes a [`ReportSource`] (the scraper) with any
//! [`ReportStore`](efd_core::store::ReportStore):
//!
//! ```text
//! advance watermark ─▶ fetch headers ─▶ resolve amendments
//!        ─▶ fetch transaction cells ─▶ commit reports ─▶ record run
//! ```
//!
//! The flat-file dump of a store lives in [`export`].

pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod source;
pub mod watermark;

pub use config::IngestConfig;
pub use error::{Error, Result, SourceError};
pub use pipeline::ingest;
pub use source::{FixtureBundle, FixtureSource, ReportSource};
pub use watermark::{Watermark, advance_watermark};
