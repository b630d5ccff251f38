//! `observatorio`: command-line client for the Observatório case catalog.
//!
//! # Usage
//!
//! ```text
//! observatorio bootstrap-root --email root@observatorio.org --name Coordenação
//! observatorio login --email root@observatorio.org --remember
//! observatorio search horta --category "Meio Ambiente"
//! OBSERVATORIO_SYNC__ENVIRONMENT=hosted observatorio list
//! ```

mod commands;
mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use commands::Command;
use observatorio_core::clock::SystemClock;
use observatorio_store_sqlite::SqliteStore;
use observatorio_sync::{CaseMode, Observatorio};
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "observatorio", author, version, about = "Observatório case catalog client")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "observatorio.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

/// `RUST_LOG`-style directives over an `info` default.
fn log_filter(directives: &str) -> EnvFilter {
  EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .parse_lossy(directives)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(log_filter(
      &std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default(),
    ))
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store_path = settings.store_path();
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let api = match settings.sync.environment.case_mode() {
    CaseMode::Remote => Some(commands::api_client(&settings).await?),
    CaseMode::Local => None,
  };
  let app = Observatorio::start(&settings.sync, Arc::new(store), Arc::new(SystemClock), api)
    .await
    .context("failed to start")?;
  tracing::debug!(mode = ?app.cases.mode(), "ready");

  commands::run(&app, &settings, cli.command).await
}
