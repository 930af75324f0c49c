use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::CachePolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Custom title for header (defaults to API host if not set)
  pub title: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub search: SearchConfig,
  #[serde(default)]
  pub webhook: WebhookConfig,
  #[serde(default)]
  pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// REST base URL, e.g. https://desk.example.com/api
  pub url: String,
  /// WebSocket base URL; derived from `url` when unset
  pub ws_url: Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  15
}

impl ApiConfig {
  /// REST base with a trailing slash so relative joins keep the path.
  pub fn base_url(&self) -> Result<Url> {
    parse_base(&self.url)
  }

  /// WebSocket base: explicit `ws_url`, or `url` with a ws scheme and `/ws/` path.
  pub fn ws_base_url(&self) -> Result<Url> {
    if let Some(ws) = &self.ws_url {
      return parse_base(ws);
    }
    let mut url = self.base_url()?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url
      .set_scheme(scheme)
      .map_err(|_| eyre!("Cannot derive WebSocket URL from {}", self.url))?;
    url.set_path("/ws/");
    Ok(url)
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

fn parse_base(raw: &str) -> Result<Url> {
  let with_slash = if raw.ends_with('/') {
    raw.to_string()
  } else {
    format!("{}/", raw)
  };
  Url::parse(&with_slash).map_err(|e| eyre!("Invalid URL {}: {}", raw, e))
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_stale_secs")]
  pub stale_secs: u64,
  #[serde(default = "default_retries")]
  pub retries: u32,
  #[serde(default = "default_retry_delay_ms")]
  pub retry_delay_ms: u64,
  /// Keep last good results on disk for offline mode
  #[serde(default = "default_true")]
  pub persist: bool,
}

fn default_stale_secs() -> u64 {
  30
}

fn default_retries() -> u32 {
  3
}

fn default_retry_delay_ms() -> u64 {
  1000
}

fn default_true() -> bool {
  true
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_secs: default_stale_secs(),
      retries: default_retries(),
      retry_delay_ms: default_retry_delay_ms(),
      persist: true,
    }
  }
}

impl CacheConfig {
  pub fn policy(&self) -> CachePolicy {
    CachePolicy {
      stale_time: Duration::from_secs(self.stale_secs),
      retries: self.retries,
      retry_delay: Duration::from_millis(self.retry_delay_ms),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
  #[serde(default = "default_debounce_ms")]
  pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
  500
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      debounce_ms: default_debounce_ms(),
    }
  }
}

impl SearchConfig {
  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
  #[serde(default = "default_listen")]
  pub listen: String,
  /// Accepted clock skew for signed timestamps
  #[serde(default = "default_tolerance_secs")]
  pub tolerance_secs: u64,
}

fn default_listen() -> String {
  "127.0.0.1:3001".to_string()
}

fn default_tolerance_secs() -> u64 {
  300
}

impl Default for WebhookConfig {
  fn default() -> Self {
    Self {
      listen: default_listen(),
      tolerance_secs: default_tolerance_secs(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportConfig {
  pub dir: Option<PathBuf>,
}

impl ExportConfig {
  /// Target directory for receipts and worksheets.
  pub fn dir(&self) -> PathBuf {
    if let Some(dir) = &self.dir {
      return expand_home(dir);
    }
    dirs::download_dir()
      .or_else(dirs::home_dir)
      .unwrap_or_else(|| PathBuf::from("."))
      .join("deskboard")
  }
}

fn expand_home(path: &Path) -> PathBuf {
  match (path.strip_prefix("~"), dirs::home_dir()) {
    (Ok(rest), Some(home)) => home.join(rest),
    _ => path.to_path_buf(),
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./deskboard.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/deskboard/config.yaml
  /// 4. ~/.config/deskboard/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/deskboard/config.yaml\n\
                 with at least:\n  api:\n    url: https://desk.example.com/api"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("deskboard.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("deskboard").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.api.base_url()?;
    Ok(config)
  }

  /// Get the API token from environment variables.
  ///
  /// Checks DESKBOARD_API_TOKEN first, then DESK_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("DESKBOARD_API_TOKEN")
      .or_else(|_| std::env::var("DESK_API_TOKEN"))
      .map_err(|_| {
        eyre!("API token not found. Set DESKBOARD_API_TOKEN or DESK_API_TOKEN environment variable.")
      })
  }

  /// Get the identity provider webhook secret (`whsec_...`).
  pub fn get_webhook_secret() -> Result<String> {
    std::env::var("DESKBOARD_WEBHOOK_SECRET").map_err(|_| {
      eyre!("Webhook secret not found. Set DESKBOARD_WEBHOOK_SECRET environment variable.")
    })
  }

  /// Header title: configured title or the API host
  pub fn display_title(&self) -> String {
    if let Some(title) = &self.title {
      return title.clone();
    }
    self
      .api
      .base_url()
      .ok()
      .and_then(|u| u.host_str().map(String::from))
      .unwrap_or_else(|| self.api.url.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("api:\n  url: https://desk.example.com/api\n").unwrap();
    assert_eq!(config.cache.stale_secs, 30);
    assert_eq!(config.cache.retries, 3);
    assert!(config.cache.persist);
    assert_eq!(config.search.debounce(), Duration::from_millis(500));
    assert_eq!(config.webhook.listen, "127.0.0.1:3001");
    assert_eq!(config.display_title(), "desk.example.com");
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
api:
  url: http://localhost:8000/api/
  ws_url: ws://localhost:9000/live
  timeout_secs: 5
title: Mesa de ayuda
cache:
  stale_secs: 10
  retries: 1
  retry_delay_ms: 250
  persist: false
search:
  debounce_ms: 300
webhook:
  listen: 0.0.0.0:4000
  tolerance_secs: 60
export:
  dir: /tmp/exports
"#;
    let config = Config::parse(yaml).unwrap();
    let policy = config.cache.policy();
    assert_eq!(policy.stale_time, Duration::from_secs(10));
    assert_eq!(policy.retries, 1);
    assert_eq!(policy.retry_delay, Duration::from_millis(250));
    assert!(!config.cache.persist);
    assert_eq!(config.display_title(), "Mesa de ayuda");
    assert_eq!(config.api.timeout(), Duration::from_secs(5));
    assert_eq!(
      config.api.ws_base_url().unwrap().as_str(),
      "ws://localhost:9000/live/"
    );
    assert_eq!(config.export.dir(), PathBuf::from("/tmp/exports"));
  }

  #[test]
  fn test_base_url_gets_trailing_slash() {
    let config = Config::parse("api:\n  url: https://desk.example.com/api\n").unwrap();
    let base = config.api.base_url().unwrap();
    assert_eq!(base.as_str(), "https://desk.example.com/api/");
    assert_eq!(
      base.join("ordenes/").unwrap().as_str(),
      "https://desk.example.com/api/ordenes/"
    );
  }

  #[test]
  fn test_ws_url_is_derived() {
    let config = Config::parse("api:\n  url: https://desk.example.com/api\n").unwrap();
    assert_eq!(
      config.api.ws_base_url().unwrap().as_str(),
      "wss://desk.example.com/ws/"
    );
  }

  #[test]
  fn test_invalid_url_is_rejected() {
    assert!(Config::parse("api:\n  url: not a url\n").is_err());
  }
}
