//! [`ReportStore`] over a single SQLite database.

use std::{collections::BTreeSet, path::Path};

use chrono::{NaiveDate, Utc};
use efd_core::{
  report::{
    IngestRun, NewIgnoredReport, NewReportHeader, NewTransaction, ReportHeader, ReportId,
    ReportKey,
  },
  store::{ReportStore, StoreDump},
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    HEADER_COLUMNS, IGNORED_COLUMNS, RawHeader, RawIgnored, RawRun, RawTrade, TRANSACTION_COLUMNS,
    decode_date, encode_counts, encode_date, encode_dt, encode_uuid, transaction_from_row,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A report store backed by a single SQLite file.
///
/// Clones share the same background connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open a fresh in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Delete headers selected by `filter` (a `WHERE` clause over `header`)
  /// together with their transactions, once per parameter set, in a single
  /// SQLite transaction. Returns the number of headers deleted.
  async fn delete_headers_where(
    &self,
    filter: &'static str,
    param_sets: Vec<Vec<String>>,
  ) -> Result<usize> {
    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let deleted = delete_headers_in(&tx, filter, &param_sets)?;
        tx.commit()?;
        Ok(deleted)
      })
      .await?;
    Ok(deleted)
  }
}

/// Delete headers matching `filter`, and their transactions, within `tx`.
fn delete_headers_in(
  tx: &rusqlite::Transaction<'_>,
  filter: &str,
  param_sets: &[Vec<String>],
) -> rusqlite::Result<usize> {
  let mut delete_transactions = tx.prepare(&format!(
    "DELETE FROM transactions
     WHERE report_id IN (SELECT report_id FROM header WHERE {filter})"
  ))?;
  let mut delete_headers = tx.prepare(&format!("DELETE FROM header WHERE {filter}"))?;

  let mut deleted = 0usize;
  for values in param_sets {
    delete_transactions.execute(rusqlite::params_from_iter(values.iter()))?;
    deleted += delete_headers.execute(rusqlite::params_from_iter(values.iter()))?;
  }
  Ok(deleted)
}

// ─── ReportStore impl ────────────────────────────────────────────────────────

impl ReportStore for SqliteStore {
  type Error = Error;

  // ── Headers ───────────────────────────────────────────────────────────────

  async fn upsert_headers(&self, headers: Vec<NewReportHeader>) -> Result<Vec<ReportHeader>> {
    let raws: Vec<RawHeader> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut stored = Vec::with_capacity(headers.len());
        {
          // An existing link keeps its row; the lookup returns it unchanged.
          let mut insert = tx.prepare(
            "INSERT INTO header (first_name, last_name, report_title, date_filed, report_link)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (report_link) DO NOTHING",
          )?;
          let mut lookup = tx.prepare(&format!(
            "SELECT {HEADER_COLUMNS} FROM header WHERE report_link = ?1"
          ))?;

          for h in &headers {
            insert.execute(rusqlite::params![
              h.first_name,
              h.last_name,
              h.report_title,
              encode_date(h.date_filed),
              h.report_link,
            ])?;
            stored.push(lookup.query_row(
              rusqlite::params![h.report_link],
              RawHeader::from_row,
            )?);
          }
        }
        tx.commit()?;
        Ok(stored)
      })
      .await?;

    raws.into_iter().map(RawHeader::into_header).collect()
  }

  async fn find_by_links(&self, links: Vec<String>) -> Result<Vec<ReportHeader>> {
    let raws: Vec<RawHeader> = self
      .conn
      .call(move |conn| {
        let mut lookup = conn.prepare(&format!(
          "SELECT {HEADER_COLUMNS} FROM header WHERE report_link = ?1"
        ))?;
        let mut found = Vec::new();
        for link in &links {
          if let Some(raw) = lookup
            .query_row(rusqlite::params![link], RawHeader::from_row)
            .optional()?
          {
            found.push(raw);
          }
        }
        Ok(found)
      })
      .await?;

    raws.into_iter().map(RawHeader::into_header).collect()
  }

  async fn transactions_pending(&self, report_id: ReportId) -> Result<bool> {
    let count: Option<i64> = self
      .conn
      .call(move |conn| {
        let exists = conn
          .query_row(
            "SELECT 1 FROM header WHERE report_id = ?1",
            rusqlite::params![report_id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if !exists {
          return Ok(None);
        }

        let count: i64 = conn.query_row(
          "SELECT COUNT(*) FROM transactions WHERE report_id = ?1",
          rusqlite::params![report_id],
          |r| r.get(0),
        )?;
        Ok(Some(count))
      })
      .await?;

    match count {
      Some(n) => Ok(n == 0),
      None => Err(efd_core::Error::HeaderNotFound(report_id).into()),
    }
  }

  // ── Transactions ──────────────────────────────────────────────────────────

  async fn append_transactions(&self, rows: Vec<NewTransaction>) -> Result<usize> {
    let row_count = rows.len();

    let missing: Vec<ReportId> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let referenced: BTreeSet<ReportId> = rows.iter().map(|r| r.report_id).collect();

        let mut missing = Vec::new();
        {
          let mut exists = tx.prepare("SELECT 1 FROM header WHERE report_id = ?1")?;
          for id in &referenced {
            if !exists.exists(rusqlite::params![id])? {
              missing.push(*id);
            }
          }
        }
        if !missing.is_empty() {
          // Dropping `tx` rolls back; nothing has been written.
          return Ok(missing);
        }

        {
          let mut insert = tx.prepare(
            "INSERT INTO transactions (
               report_id, transaction_id, transaction_date, owner, security,
               company, security_type, transaction_type, amount_range, comment
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          )?;
          for r in &rows {
            insert.execute(rusqlite::params![
              r.report_id,
              r.transaction_id,
              r.transaction_date,
              r.owner,
              r.security,
              r.company,
              r.security_type,
              r.transaction_type,
              r.amount_range,
              r.comment,
            ])?;
          }
        }
        tx.commit()?;
        Ok(missing)
      })
      .await?;

    if !missing.is_empty() {
      return Err(efd_core::Error::ReferentialIntegrityViolation {
        missing,
        rejected: row_count,
      }
      .into());
    }
    Ok(row_count)
  }

  // ── Watermark support ─────────────────────────────────────────────────────

  async fn latest_filing_date(&self) -> Result<Option<NaiveDate>> {
    let latest: Option<String> = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT MAX(date_filed) FROM header", [], |r| r.get(0))?)
      })
      .await?;

    latest.as_deref().map(decode_date).transpose()
  }

  async fn delete_headers_on_date(&self, date: NaiveDate) -> Result<usize> {
    self
      .delete_headers_where("date_filed = ?1", vec![vec![encode_date(date)]])
      .await
  }

  async fn pending_watermark(&self) -> Result<Option<NaiveDate>> {
    let pending: Option<String> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row("SELECT since FROM pending_watermark WHERE id = 1", [], |r| {
              r.get(0)
            })
            .optional()?,
        )
      })
      .await?;

    pending.as_deref().map(decode_date).transpose()
  }

  async fn begin_watermark(&self, date: NaiveDate) -> Result<usize> {
    let since = encode_date(date);
    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO pending_watermark (id, since) VALUES (1, ?1)
           ON CONFLICT (id) DO UPDATE SET since = excluded.since",
          rusqlite::params![since],
        )?;
        let deleted = delete_headers_in(&tx, "date_filed = ?1", &[vec![since]])?;
        tx.commit()?;
        Ok(deleted)
      })
      .await?;
    Ok(deleted)
  }

  async fn prune_pending_headers(&self) -> Result<usize> {
    let pruned = self
      .conn
      .call(|conn| {
        Ok(conn.execute(
          "DELETE FROM header
           WHERE NOT EXISTS (
             SELECT 1 FROM transactions t WHERE t.report_id = header.report_id
           )",
          [],
        )?)
      })
      .await?;
    Ok(pruned)
  }

  async fn delete_superseded<'a>(&'a self, keys: &'a [ReportKey]) -> Result<usize> {
    let param_sets = keys
      .iter()
      .map(|k| vec![k.first_name.clone(), k.last_name.clone(), k.report_title.clone()])
      .collect();

    self
      .delete_headers_where(
        "first_name = ?1 AND last_name = ?2 AND report_title = ?3",
        param_sets,
      )
      .await
  }

  // ── Audit ─────────────────────────────────────────────────────────────────

  async fn record_ignored(&self, run_id: Uuid, entries: Vec<NewIgnoredReport>) -> Result<()> {
    let run_id_str = encode_uuid(run_id);
    let at_str     = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut insert = tx.prepare(&format!(
            "INSERT INTO ignored_reports ({IGNORED_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
          ))?;
          for e in &entries {
            insert.execute(rusqlite::params![
              run_id_str,
              e.key.first_name,
              e.key.last_name,
              e.key.report_title,
              e.report_link,
              e.date_filed.map(encode_date),
              at_str,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn record_run(&self, run: IngestRun) -> Result<()> {
    let run_id_str   = encode_uuid(run.run_id);
    let started_str  = encode_dt(run.started_at);
    let finished_str = encode_dt(run.finished_at);
    let since_str    = encode_date(run.since);
    let counts_str   = encode_counts(&run.counts)?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO ingest_runs (run_id, started_at, finished_at, since, counts)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![run_id_str, started_str, finished_str, since_str, counts_str],
        )?;
        tx.execute("DELETE FROM pending_watermark", [])?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn full_dump(&self) -> Result<StoreDump> {
    let (headers, transactions, trades, ignored, runs) = self
      .conn
      .call(|conn| {
        // One read transaction so the tables are mutually consistent.
        let tx = conn.transaction()?;

        let mut stmt = tx.prepare(&format!(
          "SELECT {HEADER_COLUMNS} FROM header ORDER BY date_filed, report_id"
        ))?;
        let headers = stmt
          .query_map([], RawHeader::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = tx.prepare(&format!(
          "SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY report_id, transaction_id"
        ))?;
        let transactions = stmt
          .query_map([], transaction_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = tx.prepare(
          "SELECT
             h.report_id, h.first_name, h.last_name, h.report_title,
             h.date_filed, h.report_link,
             t.master_transaction_id, t.report_id, t.transaction_id,
             t.transaction_date, t.owner, t.security, t.company,
             t.security_type, t.transaction_type, t.amount_range, t.comment
           FROM transactions t
           JOIN header h ON h.report_id = t.report_id
           ORDER BY h.date_filed, h.report_id, t.transaction_id",
        )?;
        let trades = stmt
          .query_map([], RawTrade::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = tx.prepare(&format!(
          "SELECT {IGNORED_COLUMNS} FROM ignored_reports ORDER BY ignored_id"
        ))?;
        let ignored = stmt
          .query_map([], RawIgnored::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = tx.prepare(
          "SELECT run_id, started_at, finished_at, since, counts
           FROM ingest_runs ORDER BY started_at",
        )?;
        let runs = stmt
          .query_map([], RawRun::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((headers, transactions, trades, ignored, runs))
      })
      .await?;

    Ok(StoreDump {
      headers: headers
        .into_iter()
        .map(RawHeader::into_header)
        .collect::<Result<_>>()?,
      transactions,
      trades: trades
        .into_iter()
        .map(RawTrade::into_trade)
        .collect::<Result<_>>()?,
      ignored: ignored
        .into_iter()
        .map(RawIgnored::into_ignored)
        .collect::<Result<_>>()?,
      runs: runs
        .into_iter()
        .map(RawRun::into_run)
        .collect::<Result<_>>()?,
    })
  }
}
