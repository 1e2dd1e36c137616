//! Transaction row parser.
//!
//! A report's transaction table arrives as one flat sequence of cell texts.
//! Each transaction occupies [`FIELDS_PER_TRANSACTION`] consecutive cells:
//!
//! ```text
//! #  | date | owner | ticker | asset name | asset type | type | amount | comment
//! ```
//!
//! The leading `#` cell is dropped; the chunk ordinal becomes
//! `transaction_id`. A trailing chunk shorter than the width is a partial row
//! and is dropped; [`TransactionRows::malformed`] reports it so the caller can
//! log it.

use std::{num::NonZeroUsize, slice::ChunksExact};

use crate::{
  Error,
  report::{NewTransaction, ReportId},
};

/// Number of cells one transaction occupies in a scraped table.
pub const FIELDS_PER_TRANSACTION: usize = 9;

const TRANSACTION_WIDTH: NonZeroUsize = match NonZeroUsize::new(FIELDS_PER_TRANSACTION) {
  Some(width) => width,
  None => panic!("transaction width must be non-zero"),
};

/// Replace embedded line breaks with a single space.
///
/// `\r\n`, `\n` and `\r` each count as one break.
pub fn normalize_cell(cell: &str) -> String {
  cell.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// Lazily parse `cells` into transactions owned by `report_id`.
pub fn parse_transactions(report_id: ReportId, cells: &[String]) -> TransactionRows<'_> {
  parse_transactions_with_width(report_id, cells, TRANSACTION_WIDTH)
}

/// As [`parse_transactions`], for a table of `width` cells per row.
///
/// Widths below [`FIELDS_PER_TRANSACTION`] leave the missing fields empty.
pub fn parse_transactions_with_width(
  report_id: ReportId,
  cells: &[String],
  width: NonZeroUsize,
) -> TransactionRows<'_> {
  TransactionRows {
    report_id,
    width,
    total: cells.len(),
    chunks: cells.chunks_exact(width.get()),
    ordinal: 0,
  }
}

/// Iterator over the complete transaction chunks of one report.
#[derive(Debug, Clone)]
pub struct TransactionRows<'a> {
  report_id: ReportId,
  width:     NonZeroUsize,
  total:     usize,
  chunks:    ChunksExact<'a, String>,
  ordinal:   u32,
}

impl TransactionRows<'_> {
  /// Number of complete rows in the block, independent of iteration progress.
  pub fn complete_rows(&self) -> usize { self.total / self.width.get() }

  /// Cells in the trailing partial chunk that will not be parsed.
  pub fn dropped_cells(&self) -> usize { self.total % self.width.get() }

  /// The [`Error::MalformedTransactionBlock`] describing the dropped tail,
  /// if there is one.
  pub fn malformed(&self) -> Option<Error> {
    (self.dropped_cells() > 0).then_some(Error::MalformedTransactionBlock {
      cells: self.total,
      width: self.width.get(),
    })
  }
}

impl Iterator for TransactionRows<'_> {
  type Item = NewTransaction;

  fn next(&mut self) -> Option<Self::Item> {
    let chunk = self.chunks.next()?;
    self.ordinal += 1;
    let field = |i: usize| chunk.get(i).map(|c| normalize_cell(c)).unwrap_or_default();

    Some(NewTransaction {
      report_id:        self.report_id,
      transaction_id:   self.ordinal,
      transaction_date: field(1),
      owner:            field(2),
      security:         field(3),
      company:          field(4),
      security_type:    field(5),
      transaction_type: field(6),
      amount_range:     field(7),
      comment:          field(8),
    })
  }

  fn size_hint(&self) -> (usize, Option<usize>) { self.chunks.size_hint() }
}

impl ExactSizeIterator for TransactionRows<'_> {}
