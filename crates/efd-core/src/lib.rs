//! Core types and trait definitions for periodic transaction report ingestion.
//!
//! This crate is free of HTTP, browser and database dependencies. It holds
//! the domain model, the two pure text-processing stages (transaction row
//! parsing and amendment resolution) and the [`store::ReportStore`]
//! abstraction that storage backends implement.

// Native `async fn` in traits; the futures' `Send` bounds are spelled out
// explicitly on the trait methods.
#![allow(async_fn_in_trait)]

pub mod amendment;
pub mod error;
pub mod report;
pub mod store;
pub mod transaction;

pub use error::{Error, Result};
