//! Settings read from the config file and `EFD_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::NaiveDate;
use efd_ingest::{IngestConfig, config::default_epoch};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// SQLite database file.
  pub store_path:        PathBuf,
  /// JSON scrape bundle replayed by `efd ingest`.
  pub fixture_path:      PathBuf,
  /// Output directory of `efd dump`.
  pub dump_dir:          PathBuf,
  pub epoch:             NaiveDate,
  pub retire_superseded: bool,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path:        PathBuf::from("efd.sqlite3"),
      fixture_path:      PathBuf::from("scrape.json"),
      dump_dir:          PathBuf::from("dump"),
      epoch:             default_epoch(),
      retire_superseded: true,
    }
  }
}

impl Settings {
  /// Layer the optional TOML file at `path` under the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("EFD"))
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise settings")
  }

  /// Pipeline settings, with `since` replacing the configured epoch.
  pub fn ingest_config(&self, since: Option<NaiveDate>) -> IngestConfig {
    IngestConfig {
      epoch:             since.unwrap_or(self.epoch),
      retire_superseded: self.retire_superseded,
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
