//! Flat-file dump of a store's contents.
//!
//! Each table becomes one comma-separated file with a header row. Fields are
//! quoted when they contain the separator, a quote or a line break, with
//! embedded quotes doubled.

use std::{
  fs::{self, File},
  io::{self, BufWriter, Write},
  path::{Path, PathBuf},
};

use efd_core::store::StoreDump;
use tracing::info;

const SEP: char = ',';

pub const HEADER_FILE: &str = "header.csv";
pub const TRANSACTIONS_FILE: &str = "transactions.csv";
pub const AMENDED_FILE: &str = "amended_reports.csv";
pub const TRADES_FILE: &str = "trades.csv";

// ─── Writing ─────────────────────────────────────────────────────────────────

fn needs_quotes(field: &str) -> bool {
  field.contains(SEP) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write a single row, terminated by `\n`.
pub fn write_row<W: Write>(w: &mut W, row: &[String]) -> io::Result<()> {
  for (i, cell) in row.iter().enumerate() {
    if i > 0 {
      write!(w, "{SEP}")?;
    }
    if needs_quotes(cell) {
      write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
    } else {
      w.write_all(cell.as_bytes())?;
    }
  }
  writeln!(w)
}

fn write_table(path: &Path, columns: &[&str], rows: impl Iterator<Item = Vec<String>>) -> io::Result<usize> {
  let mut w = BufWriter::new(File::create(path)?);
  let columns: Vec<String> = columns.iter().map(|c| (*c).to_owned()).collect();
  write_row(&mut w, &columns)?;

  let mut n = 0;
  for row in rows {
    write_row(&mut w, &row)?;
    n += 1;
  }
  w.flush()?;
  Ok(n)
}

// ─── Dump ────────────────────────────────────────────────────────────────────

/// Write every table of `dump` into `dir`, creating it if needed. Returns the
/// paths written.
pub fn write_dump(dump: &StoreDump, dir: &Path) -> io::Result<Vec<PathBuf>> {
  fs::create_dir_all(dir)?;
  let mut written = Vec::with_capacity(4);

  let path = dir.join(HEADER_FILE);
  let n = write_table(
    &path,
    &["report_id", "first_name", "last_name", "report_title", "date_filed", "report_link"],
    dump.headers.iter().map(|h| {
      vec![
        h.report_id.to_string(),
        h.first_name.clone(),
        h.last_name.clone(),
        h.report_title.clone(),
        h.date_filed.to_string(),
        h.report_link.clone(),
      ]
    }),
  )?;
  info!(path = %path.display(), rows = n, "wrote headers");
  written.push(path);

  let path = dir.join(TRANSACTIONS_FILE);
  let n = write_table(
    &path,
    &[
      "master_transaction_id",
      "report_id",
      "transaction_id",
      "transaction_date",
      "owner",
      "security",
      "company",
      "security_type",
      "transaction_type",
      "amount_range",
      "comment",
    ],
    dump.transactions.iter().map(|t| {
      vec![
        t.master_transaction_id.to_string(),
        t.report_id.to_string(),
        t.transaction_id.to_string(),
        t.transaction_date.clone(),
        t.owner.clone(),
        t.security.clone(),
        t.company.clone(),
        t.security_type.clone(),
        t.transaction_type.clone(),
        t.amount_range.clone(),
        t.comment.clone(),
      ]
    }),
  )?;
  info!(path = %path.display(), rows = n, "wrote transactions");
  written.push(path);

  let path = dir.join(AMENDED_FILE);
  let n = write_table(
    &path,
    &[
      "run_id",
      "first_name",
      "last_name",
      "report_title",
      "report_link",
      "date_filed",
      "recorded_at",
    ],
    dump.ignored.iter().map(|r| {
      vec![
        r.run_id.to_string(),
        r.key.first_name.clone(),
        r.key.last_name.clone(),
        r.key.report_title.clone(),
        r.report_link.clone().unwrap_or_default(),
        r.date_filed.map(|d| d.to_string()).unwrap_or_default(),
        r.recorded_at.to_rfc3339(),
      ]
    }),
  )?;
  info!(path = %path.display(), rows = n, "wrote amended reports");
  written.push(path);

  let path = dir.join(TRADES_FILE);
  let n = write_table(
    &path,
    &[
      "report_id",
      "first_name",
      "last_name",
      "report_title",
      "date_filed",
      "report_link",
      "transaction_id",
      "transaction_date",
      "owner",
      "security",
      "company",
      "security_type",
      "transaction_type",
      "amount_range",
      "comment",
    ],
    dump.trades.iter().map(|t| {
      vec![
        t.report_id.to_string(),
        t.first_name.clone(),
        t.last_name.clone(),
        t.report_title.clone(),
        t.date_filed.to_string(),
        t.report_link.clone(),
        t.transaction_id.to_string(),
        t.transaction_date.clone(),
        t.owner.clone(),
        t.security.clone(),
        t.company.clone(),
        t.security_type.clone(),
        t.transaction_type.clone(),
        t.amount_range.clone(),
        t.comment.clone(),
      ]
    }),
  )?;
  info!(path = %path.display(), rows = n, "wrote trades");
  written.push(path);

  Ok(written)
}
