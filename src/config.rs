use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::store::DEFAULT_QUOTA_BYTES;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub connectivity: ConnectivityConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL every request path is appended to
  #[serde(default = "default_base_url")]
  pub base_url: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
    }
  }
}

fn default_base_url() -> String {
  "http://localhost:8000/api".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
  /// Database file (defaults to $XDG_DATA_HOME/splitsync/store.db)
  pub path: Option<PathBuf>,
  #[serde(default = "default_quota_bytes")]
  pub quota_bytes: u64,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      path: None,
      quota_bytes: DEFAULT_QUOTA_BYTES,
    }
  }
}

fn default_quota_bytes() -> u64 {
  DEFAULT_QUOTA_BYTES
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityConfig {
  /// Seconds between reachability probes
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: default_probe_interval_secs(),
    }
  }
}

impl ConnectivityConfig {
  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.probe_interval_secs.max(1))
  }
}

fn default_probe_interval_secs() -> u64 {
  5
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Log file directory (defaults to $XDG_DATA_HOME/splitsync/logs)
  pub directory: Option<PathBuf>,
  /// Filter directives, overridden by RUST_LOG
  #[serde(default = "default_log_filter")]
  pub filter: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      directory: None,
      filter: default_log_filter(),
    }
  }
}

fn default_log_filter() -> String {
  "splitsync=info".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./splitsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/splitsync/config.yaml
  ///
  /// Without a file the defaults are used.
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("splitsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("splitsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;
    config.base_url()?;
    Ok(config)
  }

  pub fn base_url(&self) -> Result<Url> {
    Url::parse(&self.api.base_url)
      .map_err(|e| eyre!("Invalid api.base_url '{}': {}", self.api.base_url, e))
  }

  /// Get a bearer token from the environment, if one is set.
  ///
  /// Checks SPLITSYNC_TOKEN.
  pub fn token_from_env() -> Option<String> {
    std::env::var("SPLITSYNC_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_file_uses_defaults() {
    let config = Config::parse("{}").unwrap();
    assert_eq!(config.api.base_url, "http://localhost:8000/api");
    assert_eq!(config.storage.quota_bytes, DEFAULT_QUOTA_BYTES);
    assert_eq!(config.connectivity.probe_interval(), Duration::from_secs(5));
    assert_eq!(config.log.filter, "splitsync=info");
  }

  #[test]
  fn test_partial_sections() {
    let config = Config::parse(
      "api:\n  base_url: https://split.example.com/api\nstorage:\n  quota_bytes: 1024\n",
    )
    .unwrap();
    assert_eq!(config.base_url().unwrap().host_str(), Some("split.example.com"));
    assert_eq!(config.storage.quota_bytes, 1024);
    assert!(config.storage.path.is_none());
  }

  #[test]
  fn test_invalid_base_url_is_rejected() {
    assert!(Config::parse("api:\n  base_url: not a url\n").is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/splitsync.yaml"))).is_err());
  }
}
