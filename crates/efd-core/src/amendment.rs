//! Amendment chain resolution.
//!
//! Amended reports carry titles such as
//! `Periodic Transaction Report for 01/02/2020 (Amendment 2)`. The fixed
//! prefix (the root title) is shared by the original and every amendment;
//! the digit before the closing parenthesis is the amendment version.
//!
//! Only the highest version of a chain is authoritative. For each amended
//! header the resolver emits the keys of every lower version, and any header
//! matching one of those keys is excluded.
//!
//! Versions are read from a single character, so "(Amendment 12)" reads as
//! version 2. This matches the behaviour the stored data was produced with.

use std::collections::BTreeSet;

use crate::report::{NewIgnoredReport, NewReportHeader, ReportKey};

/// The title prefix whose length delimits the root title.
pub const ROOT_TITLE_PATTERN: &str = "Periodic Transaction Report for 00/00/0000";

/// Substring marking a title as an amendment.
pub const AMENDMENT_MARKER: &str = "Amendment";

/// Root title and amendment version parsed from a report title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportIdentity {
  pub root:             String,
  /// 0 for an original filing.
  pub version:          u32,
  /// True when the title is an amendment but carries no readable version
  /// digit, so version 1 was assumed.
  pub version_inferred: bool,
}

impl ReportIdentity {
  pub fn is_amendment(&self) -> bool { self.version > 0 }

  /// The title of version `version` of this chain.
  pub fn title_for(&self, version: u32) -> String {
    if version == 0 {
      self.root.clone()
    } else {
      format!("{} (Amendment {version})", self.root)
    }
  }
}

/// Split a report title into its root title and amendment version.
pub fn parse_report_identity(title: &str) -> ReportIdentity {
  if !title.contains(AMENDMENT_MARKER) {
    return ReportIdentity {
      root:             title.to_owned(),
      version:          0,
      version_inferred: false,
    };
  }

  let root_len = ROOT_TITLE_PATTERN.chars().count();
  let root = match title.char_indices().nth(root_len) {
    Some((end, _)) => title[..end].to_owned(),
    None => title.trim_end().to_owned(),
  };

  let digit = title
    .trim_end()
    .strip_suffix(')')
    .and_then(|rest| rest.trim_end().chars().last())
    .and_then(|c| c.to_digit(10));

  ReportIdentity {
    root,
    version: digit.unwrap_or(1),
    version_inferred: digit.is_none(),
  }
}

/// Keys of every version an amended header supersedes: the root title and
/// each lower-numbered amendment. Empty for an original filing.
pub fn superseded_keys(header: &NewReportHeader) -> Vec<ReportKey> {
  let identity = parse_report_identity(&header.report_title);
  (0..identity.version)
    .map(|v| ReportKey::new(&header.first_name, &header.last_name, identity.title_for(v)))
    .collect()
}

/// Outcome of [`resolve_amendments`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
  /// Headers kept, in input order.
  pub authoritative: Vec<NewReportHeader>,
  /// Headers matching an exclusion entry, in input order.
  pub ignored:       Vec<NewReportHeader>,
  /// Every logical identity superseded by an amendment in the batch.
  pub exclusions:    BTreeSet<ReportKey>,
  /// Amended titles whose version digit was missing and defaulted to 1.
  pub inferred:      Vec<ReportKey>,
}

impl Resolution {
  /// Audit rows for the exclusion set: one per ignored header, plus one bare
  /// row for each excluded identity no header in the batch carried.
  pub fn audit_entries(&self) -> Vec<NewIgnoredReport> {
    let mut entries = Vec::with_capacity(self.exclusions.len());
    for key in &self.exclusions {
      let mut matched = self.ignored.iter().filter(|h| &h.key() == key).peekable();
      if matched.peek().is_none() {
        entries.push(NewIgnoredReport {
          key:         key.clone(),
          report_link: None,
          date_filed:  None,
        });
        continue;
      }
      entries.extend(matched.map(|h| NewIgnoredReport {
        key:         key.clone(),
        report_link: Some(h.report_link.clone()),
        date_filed:  Some(h.date_filed),
      }));
    }
    entries
  }
}

/// Partition `headers` into authoritative and superseded sets.
pub fn resolve_amendments(headers: Vec<NewReportHeader>) -> Resolution {
  let mut resolution = Resolution::default();

  for header in &headers {
    let identity = parse_report_identity(&header.report_title);
    if !identity.is_amendment() {
      continue;
    }
    if identity.version_inferred {
      resolution.inferred.push(header.key());
    }
    resolution.exclusions.extend(superseded_keys(header));
  }

  let (ignored, authoritative): (Vec<_>, Vec<_>) = headers
    .into_iter()
    .partition(|h| resolution.exclusions.contains(&h.key()));
  resolution.ignored = ignored;
  resolution.authoritative = authoritative;
  resolution
}
