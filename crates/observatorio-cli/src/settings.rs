//! Layered configuration: an optional TOML file, overridden by
//! `OBSERVATORIO_*` environment variables.
//!
//! Nested keys use a double underscore, e.g.
//! `OBSERVATORIO_SYNC__ENVIRONMENT=hosted`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use observatorio_sync::SyncConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  /// SQLite file holding the local state. A leading `~/` is expanded.
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,

  #[serde(default)]
  pub sync: SyncConfig,
}

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/observatorio/state.db") }

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("OBSERVATORIO")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read configuration")?;

    settings
      .try_deserialize()
      .context("failed to deserialise settings")
  }

  /// [`store_path`](Self::store_path) with `~` expanded.
  pub fn store_path(&self) -> PathBuf {
    let s = self.store_path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/")
      && let Ok(home) = std::env::var("HOME")
    {
      return PathBuf::from(home).join(rest);
    }
    self.store_path.clone()
  }
}
