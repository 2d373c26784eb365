mod app;
mod cache;
mod commands;
mod config;
mod event;
mod http;
mod worker;

use clap::Parser;
use color_eyre::Result;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use cache::{MemoryStorage, SqliteStorage};

#[derive(Parser, Debug)]
#[command(name = "swcache")]
#[command(about = "Offline cache manager for a static streaming front-end")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./swcache.yaml or $XDG_CONFIG_HOME/swcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Deployed version to act as (overrides config and SWCACHE_VERSION)
  #[arg(long)]
  cache_version: Option<String>,

  /// Use a throwaway in-memory cache instead of the SQLite database
  #[arg(long)]
  ephemeral: bool,

  /// Also write logs to daily-rotated files in this directory
  #[arg(long)]
  log_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging(args.log_dir.as_deref());

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override version if specified on command line
  let config = if let Some(version) = args.cache_version {
    config::Config { version, ..config }
  } else {
    config
  };
  config.validate()?;

  if args.ephemeral {
    let app = app::App::new(config, MemoryStorage::new())?;
    return app.run(args.command).await;
  }

  let storage = match &config.database {
    Some(path) => SqliteStorage::open_at(path)?,
    None => SqliteStorage::open_default()?,
  };
  let app = app::App::new(config, storage)?;
  app.run(args.command).await
}

/// Log to stderr, and to `log_dir` when given. Keep the guard alive until exit.
fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("swcache=info"));
  let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

  match log_dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, "swcache.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();
      Some(guard)
    }
    None => {
      tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .init();
      None
    }
  }
}
