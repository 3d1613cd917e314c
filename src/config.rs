//! Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;

/// Directory under `$HOME` holding plugins, favorites and the config file.
pub const APP_DIR: &str = ".board-search";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory scanned for adapter manifests.
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: PathBuf,
    /// Favorites file. `None` keeps favorites in memory only.
    #[serde(default = "default_favorites_path")]
    pub favorites_path: Option<PathBuf>,
    /// Per-request budget for adapter calls, in seconds.
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,
    /// User agent for plain HTTP adapters and the browser.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Proxy URL (e.g. `socks5://127.0.0.1:1080`).
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Headless browser settings.
    #[serde(default)]
    pub browser: BrowserSettings,
}

/// Headless browser settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Explicit Chrome executable; auto-detected when unset.
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
    #[serde(default)]
    pub launch_args: Vec<String>,
    /// Whole-call budget for one scrape, in milliseconds. 0 disables it.
    #[serde(default)]
    pub call_timeout_ms: u64,
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `$HOME/.board-search`.
pub fn app_dir() -> PathBuf {
    home_dir().join(APP_DIR)
}

fn default_plugins_dir() -> PathBuf {
    app_dir().join("extensions")
}

fn default_favorites_path() -> Option<PathBuf> {
    Some(app_dir().join("favorites.json"))
}

fn default_search_timeout() -> u64 {
    30
}

fn default_headless() -> bool {
    true
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            launch_args: Vec::new(),
            call_timeout_ms: 0,
        }
    }
}

impl BrowserSettings {
    /// The scrape call budget, if one is configured.
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_ms > 0).then(|| Duration::from_millis(self.call_timeout_ms))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            plugins_dir: default_plugins_dir(),
            favorites_path: default_favorites_path(),
            search_timeout_secs: default_search_timeout(),
            user_agent: None,
            proxy_url: None,
            browser: BrowserSettings::default(),
        }
    }
}

impl AppConfig {
    /// Default location of the config file.
    pub fn default_path() -> PathBuf {
        app_dir().join("config.json")
    }

    /// Loads configuration from `path`, or from [`AppConfig::default_path`]
    /// when it exists. Missing files yield the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::default_path();
                if !path.exists() {
                    debug!("No config at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                path
            }
        };

        let text = std::fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&text)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Search timeout as a [`Duration`].
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.search_timeout_secs, 30);
        assert!(config.plugins_dir.ends_with("extensions"));
        assert!(config
            .favorites_path
            .as_ref()
            .is_some_and(|p| p.ends_with("favorites.json")));
        assert!(config.browser.headless);
        assert!(config.browser.call_timeout().is_none());
    }

    #[test]
    fn test_partial_json_uses_field_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"search_timeout_secs": 5, "browser": {"call_timeout_ms": 20000}}"#,
        )
        .unwrap();
        assert_eq!(config.search_timeout(), Duration::from_secs(5));
        assert!(config.browser.headless);
        assert_eq!(config.browser.call_timeout(), Some(Duration::from_millis(20000)));
        assert!(config.plugins_dir.ends_with("extensions"));
    }

    #[test]
    fn test_favorites_can_be_memory_only() {
        let config: AppConfig = serde_json::from_str(r#"{"favorites_path": null}"#).unwrap();
        assert!(config.favorites_path.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"plugins_dir": "/srv/plugins", "proxy_url": "http://127.0.0.1:8080"}"#,
        )
        .unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.plugins_dir, PathBuf::from("/srv/plugins"));
        assert_eq!(config.proxy_url.as_deref(), Some("http://127.0.0.1:8080"));
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(Some(&tmp.path().join("absent.json"))).is_err());
    }
}
