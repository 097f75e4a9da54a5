use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::BucketNames;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the controller is scoped to; manifest and endpoint paths resolve against it
  #[serde(default = "default_origin")]
  pub origin: Url,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub push: PushConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub log: LogConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: default_origin(),
      cache: CacheConfig::default(),
      sync: SyncConfig::default(),
      push: PushConfig::default(),
      storage: StorageConfig::default(),
      log: LogConfig::default(),
    }
  }
}

fn default_origin() -> Url {
  Url::parse("http://localhost:3000/").expect("static origin is valid")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Version tag appended to bucket names; bumping it orphans old buckets
  pub version: String,
  pub static_prefix: String,
  pub dynamic_prefix: String,
  /// Shell assets fetched and stored all-or-nothing at install
  pub manifest: Vec<String>,
  /// Page served for navigations that fail offline
  pub offline_page: String,
  /// Body bytes allowed per bucket (unbounded when unset)
  pub quota_bytes: Option<u64>,
  /// Network timeout in seconds
  pub timeout_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: "v1".to_string(),
      static_prefix: "swumarket-static".to_string(),
      dynamic_prefix: "swumarket-dynamic".to_string(),
      manifest: [
        "/",
        "/index.html",
        "/static/js/bundle.js",
        "/static/css/main.css",
        "/manifest.json",
        "/favicon.ico",
        "/logo192.png",
        "/logo512.png",
        "/offline.html",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      offline_page: "/offline.html".to_string(),
      quota_bytes: None,
      timeout_secs: 10,
    }
  }
}

impl CacheConfig {
  pub fn bucket_names(&self) -> BucketNames {
    BucketNames::new(&self.static_prefix, &self.dynamic_prefix, &self.version)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub cart_endpoint: String,
  pub search_endpoint: String,
  /// Clear the search queue after a delivered replay (the cart queue always is)
  pub clear_search_queue_on_success: bool,
  /// Attempts before a sync registration is abandoned
  pub max_retries: u32,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      cart_endpoint: "/api/cart/sync".to_string(),
      search_endpoint: "/api/search/sync".to_string(),
      clear_search_queue_on_success: false,
      max_retries: 3,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PushConfig {
  pub title: String,
  /// Body used when a push arrives without a readable payload
  pub default_body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  /// Page opened by the "explore" action
  pub root_path: String,
}

impl Default for PushConfig {
  fn default() -> Self {
    Self {
      title: "Swumarket".to_string(),
      default_body: "New update from Swumarket".to_string(),
      icon: "/logo192.png".to_string(),
      badge: "/logo192.png".to_string(),
      vibrate: vec![100, 50, 100],
      root_path: "/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// SQLite database path (default: $XDG_DATA_HOME/swumarket/offline.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Default filter directive; RUST_LOG takes precedence
  pub level: String,
  /// Write daily log files here instead of stderr
  pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      directory: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./swumarket.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/swumarket/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
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
    let local = PathBuf::from("swumarket.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("swumarket").join("config.yaml");
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
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.cache.version.trim().is_empty() {
      return Err(eyre!("cache.version must not be empty"));
    }
    if self.cache.static_prefix == self.cache.dynamic_prefix {
      return Err(eyre!("cache.static_prefix and cache.dynamic_prefix must differ"));
    }
    for path in self.cache.manifest.iter().chain([&self.cache.offline_page]) {
      self.resolve(path)?;
    }
    Ok(())
  }

  /// Resolve a configured path against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid path '{}': {}", path, e))
  }

  /// Database location, falling back to the platform data directory.
  pub fn database_path(&self) -> Result<PathBuf> {
    self
      .storage
      .path
      .clone()
      .or_else(crate::db::Database::default_path)
      .ok_or_else(|| eyre!("Could not determine data directory"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.cache.bucket_names().static_bucket, "swumarket-static-v1");
    assert_eq!(config.cache.bucket_names().dynamic_bucket, "swumarket-dynamic-v1");
    assert!(config.cache.manifest.contains(&config.cache.offline_page));
    assert!(!config.sync.clear_search_queue_on_success);
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::from_yaml(
      r#"
origin: https://swumarket.test
cache:
  version: v2
  manifest: ["/", "/offline.html"]
sync:
  max_retries: 5
"#,
    )
    .unwrap();

    assert_eq!(config.origin.as_str(), "https://swumarket.test/");
    assert_eq!(config.cache.bucket_names().static_bucket, "swumarket-static-v2");
    assert_eq!(config.cache.manifest.len(), 2);
    assert_eq!(config.cache.offline_page, "/offline.html");
    assert_eq!(config.sync.max_retries, 5);
    assert_eq!(config.sync.cart_endpoint, "/api/cart/sync");
    assert_eq!(config.push.vibrate, vec![100, 50, 100]);
  }

  #[test]
  fn test_rejects_identical_prefixes() {
    let result = Config::from_yaml(
      r#"
cache:
  static_prefix: same
  dynamic_prefix: same
"#,
    );
    assert!(result.is_err());
  }

  #[test]
  fn test_resolve_against_origin() {
    let config = Config::from_yaml("origin: https://swumarket.test/shop/").unwrap();
    assert_eq!(
      config.resolve("/api/cart/sync").unwrap().as_str(),
      "https://swumarket.test/api/cart/sync"
    );
    assert_eq!(
      config.resolve("offline.html").unwrap().as_str(),
      "https://swumarket.test/shop/offline.html"
    );
  }

  #[test]
  fn test_missing_explicit_path_errors() {
    assert!(Config::load(Some(Path::new("/nonexistent/swumarket.yaml"))).is_err());
  }
}
