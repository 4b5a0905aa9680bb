mod commands;

use clap::Parser;
use color_eyre::Result;
use splitsync::config::Config;
use splitsync::logging;
use splitsync::store::{MemoryStore, SqliteStore};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "splitsync")]
#[command(about = "Offline-first client for the expense-sharing API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/splitsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Keep queue, cache and token in memory for this run only
  #[arg(long)]
  ephemeral: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.log)?;

  if args.ephemeral {
    let store = MemoryStore::with_quota(config.storage.quota_bytes);
    commands::run(Arc::new(store), &config, args.command).await
  } else {
    let store = match &config.storage.path {
      Some(path) => SqliteStore::open(path, config.storage.quota_bytes)?,
      None => SqliteStore::open_default(config.storage.quota_bytes)?,
    };
    commands::run(Arc::new(store), &config, args.command).await
  }
}
