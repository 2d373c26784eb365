//! Command-line subcommands and request construction

use clap::Subcommand;
use color_eyre::Result;
use std::path::PathBuf;
use url::Url;

use crate::config::Config;
use crate::http::{Request, RequestMode};

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Install the configured version (precache the manifest), then activate it
  Install,
  /// Activate an already installed version, purging every other namespace
  Activate,
  /// Fetch targets through the cache manager
  #[command(alias = "f")]
  Fetch {
    /// Absolute URLs or paths relative to the configured origin
    #[arg(required = true)]
    targets: Vec<String>,
    /// Issue top-level navigation requests
    #[arg(short, long)]
    navigate: bool,
    /// Issue cross-origin requests in no-cors mode
    #[arg(long, conflicts_with = "navigate")]
    no_cors: bool,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Print response headers
    #[arg(short = 'i', long)]
    headers: bool,
    /// Write the body of the (single) response to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Show how targets would be routed
  #[command(alias = "c")]
  Classify {
    #[arg(required = true)]
    targets: Vec<String>,
  },
  /// List cache namespaces
  #[command(alias = "ns")]
  Namespaces,
  /// List request keys stored in a namespace (default: current)
  Entries {
    #[arg(long)]
    namespace: Option<String>,
  },
}

/// Parse an absolute URL, or resolve a path against the configured origin.
pub fn resolve_target(config: &Config, target: &str) -> Result<Url> {
  match Url::parse(target) {
    Ok(url) if url.has_host() => Ok(url),
    _ => config.resolve(target),
  }
}

/// Build the request a page would issue for `target`.
pub fn build_request(
  config: &Config,
  target: &str,
  navigate: bool,
  no_cors: bool,
  method: &str,
) -> Result<Request> {
  let url = resolve_target(config, target)?;
  let mode = if navigate {
    RequestMode::Navigate
  } else if no_cors {
    RequestMode::NoCors
  } else if url.origin() == config.origin.origin() {
    RequestMode::SameOrigin
  } else {
    RequestMode::Cors
  };

  Ok(Request::get(url).with_method(method).with_mode(mode))
}
