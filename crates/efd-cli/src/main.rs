//! `efd`: periodic transaction report ingestion.
//!
//! Reads `efd.toml` (or the path given with `--config`) layered with `EFD_*`
//! environment variables, opens the SQLite store, and either runs one
//! ingestion pass or dumps the store as CSV files.

mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use efd_core::{report::IngestRun, store::ReportStore};
use efd_ingest::{FixtureSource, export::write_dump, ingest};
use efd_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::{Settings, expand_tilde};

#[derive(Parser)]
#[command(author, version, about = "Periodic transaction report ingestion")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "efd.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run one ingestion pass against the configured scrape bundle.
  Ingest {
    /// Start date (YYYY-MM-DD) used when the store is empty.
    #[arg(long)]
    since: Option<NaiveDate>,
  },
  /// Write every table of the store as CSV.
  Dump {
    /// Output directory; defaults to `dump_dir` from the config.
    #[arg(short, long)]
    out: Option<PathBuf>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store_path = expand_tilde(&settings.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Ingest { since } => {
      let fixture_path = expand_tilde(&settings.fixture_path);
      let source = FixtureSource::load(&fixture_path)
        .await
        .with_context(|| format!("failed to load scrape bundle {fixture_path:?}"))?;

      let run = ingest(&store, &source, &settings.ingest_config(since))
        .await
        .context("ingestion failed")?;
      print_summary(&run);
    }
    Command::Dump { out } => {
      let dir = expand_tilde(&out.unwrap_or(settings.dump_dir));
      let dump = store.full_dump().await.context("failed to read store")?;
      let written = write_dump(&dump, &dir)
        .with_context(|| format!("failed to write dump to {dir:?}"))?;
      for path in written {
        println!("{}", path.display());
      }
    }
  }

  Ok(())
}

fn print_summary(run: &IngestRun) {
  let c = &run.counts;
  println!("run {} (since {})", run.run_id, run.since);
  for (label, n) in [
    ("headers fetched", c.headers_fetched),
    ("invalid headers", c.invalid_headers),
    ("duplicate headers", c.duplicate_headers),
    ("ignored as amended", c.ignored_amendments),
    ("reports stored", c.reports_stored),
    ("already stored", c.already_stored),
    ("empty reports", c.empty_reports),
    ("transactions parsed", c.transactions_parsed),
    ("transactions stored", c.transactions_stored),
    ("rows rejected", c.rows_rejected),
    ("malformed blocks", c.malformed_blocks),
    ("cleared headers", c.cleared_headers),
    ("pruned headers", c.pruned_headers),
    ("retired headers", c.retired_headers),
  ] {
    println!("  {label:<20} {n}");
  }
}
