use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Prefix for cache namespace names (e.g. "freeflix")
  pub app: String,
  /// Deployed version. Bumping it invalidates every cached namespace.
  pub version: String,
  /// Origin the site is served from; manifest paths resolve against it
  pub origin: Url,
  /// Paths eagerly cached at install time
  pub manifest: Vec<String>,
  #[serde(default = "default_shell_page")]
  pub shell_page: String,
  #[serde(default = "default_offline_page")]
  pub offline_page: String,
  /// Hosts of the metadata API (e.g. "api.themoviedb.org")
  #[serde(default)]
  pub api_hosts: Vec<String>,
  /// Query parameter that marks a versioned resource
  #[serde(default = "default_version_param")]
  pub version_param: String,
  /// Separate short-lived cache for API responses. Absent = never cached.
  pub api_cache: Option<ApiCacheConfig>,
  /// Timeout for requests leaving the site origin
  #[serde(default = "default_external_timeout_secs")]
  pub external_timeout_secs: u64,
  /// SQLite database path (default: $XDG_DATA_HOME/swcache/cache.db)
  pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct ApiCacheConfig {
  pub max_age_secs: u64,
}

fn default_shell_page() -> String {
  "/index.html".to_string()
}

fn default_offline_page() -> String {
  "/offline.html".to_string()
}

fn default_version_param() -> String {
  "v".to_string()
}

fn default_external_timeout_secs() -> u64 {
  8
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./swcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/swcache/config.yaml
  ///
  /// `SWCACHE_VERSION`, when set, overrides the file's version.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        return Err(eyre!(
          "No configuration file found. Create one at ~/.config/swcache/config.yaml\n\
                 See swcache.example.yaml for the format."
        ))
      }
    };

    if let Ok(version) = std::env::var("SWCACHE_VERSION") {
      config.version = version;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("swcache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("swcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Reject configurations the cache manager cannot serve offline with.
  pub fn validate(&self) -> Result<()> {
    if self.app.trim().is_empty() {
      return Err(eyre!("`app` must not be empty"));
    }
    if self.version.trim().is_empty() {
      return Err(eyre!("`version` must not be empty"));
    }
    if self.origin.cannot_be_a_base() {
      return Err(eyre!("`origin` must be an http(s) URL, got {}", self.origin));
    }
    let manifest = self
      .manifest
      .iter()
      .map(|p| self.resolve(p))
      .collect::<Result<Vec<_>>>()?;
    for page in [&self.shell_page, &self.offline_page] {
      let url = self.resolve(page)?;
      if !manifest.contains(&url) {
        return Err(eyre!("Manifest must contain {}", page));
      }
    }
    Ok(())
  }

  pub fn external_timeout(&self) -> Duration {
    Duration::from_secs(self.external_timeout_secs)
  }

  /// Resolve a manifest path against the site origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid path '{}' for origin {}: {}", path, self.origin, e))
  }
}
