//! Application configuration management.
//!
//! Configuration lives in a per-user config root: `$TRADEKIT_CONFIG_DIR` when
//! set, otherwise `<OS config dir>/tradekit`. The root holds `config.json`
//! (optional, defaults apply when absent) and the token cache `token.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for the config directory path
pub const APP_NAME: &str = "tradekit";

/// Overrides the config root directory
pub const CONFIG_DIR_ENV_VAR: &str = "TRADEKIT_CONFIG_DIR";

/// Overrides the API base URL from config.json
pub const BASE_URL_ENV_VAR: &str = "TRADEKIT_BASE_URL";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Token cache file name
const TOKEN_CACHE_FILE: &str = "token.json";

const DEFAULT_BASE_URL: &str = "https://api.tradekit.io";

/// Requested token lifetime when the server does not say otherwise.
const DEFAULT_TOKEN_VALIDITY_MINUTES: u32 = 60;

/// HTTP request timeout in seconds, applied to the exchange and every API call.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_token_validity_minutes")]
    pub token_validity_minutes: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(skip)]
    root: PathBuf,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_token_validity_minutes() -> u32 {
    DEFAULT_TOKEN_VALIDITY_MINUTES
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Config {
    /// Defaults rooted at `root`, without reading anything from disk.
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            base_url: default_base_url(),
            token_validity_minutes: default_token_validity_minutes(),
            request_timeout_secs: default_request_timeout_secs(),
            root,
        }
    }

    /// Load configuration from the resolved config root, applying
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(config_root()?)?;
        if let Some(url) = non_empty_env(BASE_URL_ENV_VAR) {
            config.base_url = url;
        }
        Ok(config)
    }

    /// Load `config.json` from `root`, falling back to defaults when absent.
    pub fn load_from(root: PathBuf) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str::<Config>(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Self::with_root(root.clone())
        };
        config.root = root;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic location of the single cached token.
    pub fn token_cache_path(&self) -> PathBuf {
        self.root.join(TOKEN_CACHE_FILE)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Resolve the per-user config root, honoring `TRADEKIT_CONFIG_DIR`.
pub fn config_root() -> Result<PathBuf> {
    if let Some(dir) = non_empty_env(CONFIG_DIR_ENV_VAR) {
        return Ok(PathBuf::from(dir));
    }
    let config_dir =
        dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
    Ok(config_dir.join(APP_NAME))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_config_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().to_path_buf()).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.token_validity_minutes, 60);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.token_cache_path(), dir.path().join("token.json"));
    }

    #[test]
    fn test_partial_config_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"base_url": "http://localhost:9000/", "token_validity_minutes": 15}"#,
        )
        .unwrap();

        let config = Config::load_from(dir.path().to_path_buf()).unwrap();
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.token_validity_minutes, 15);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(config.root(), dir.path());
    }

    #[test]
    fn test_invalid_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();
        assert!(Config::load_from(dir.path().to_path_buf()).is_err());
    }

    #[test]
    fn test_load_leaves_missing_root_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested");

        let config = Config::load_from(root.clone()).unwrap();
        assert_eq!(config.root(), root);
        assert!(!root.exists());
    }
}
