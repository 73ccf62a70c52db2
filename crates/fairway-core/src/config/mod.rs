//! Client configuration.
//!
//! Values come from `fairway/config.json` in the platform config directory,
//! then `FAIRWAY_*` environment variables override them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_base_url, normalize_text_option};

const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;

pub const ENV_API_URL: &str = "FAIRWAY_API_URL";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "FAIRWAY_REQUEST_TIMEOUT_MS";
pub const ENV_DB_PATH: &str = "FAIRWAY_DB_PATH";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Local database file; defaults to the platform data directory
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

const fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            db_path: None,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fairway").join(CONFIG_FILE_NAME))
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fairway")
        .join("fairway.db")
}

impl ClientConfig {
    /// Config file (when present) with environment overrides applied.
    pub fn load() -> Result<Self> {
        let mut config = match default_config_path() {
            Some(path) => Self::load_from_path(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::Config(format!(
                "Failed to parse config at {}: {}",
                path.display(),
                error
            ))
        })?;
        config.normalize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut normalized = self.clone();
        normalized.normalize();
        std::fs::write(path, serde_json::to_string_pretty(&normalized)?)?;
        Ok(())
    }

    /// Apply `FAIRWAY_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = normalize_text_option(lookup(ENV_API_URL)) {
            self.api_url = url;
        }
        if let Some(raw) = normalize_text_option(lookup(ENV_REQUEST_TIMEOUT_MS)) {
            self.request_timeout_ms = raw.parse().map_err(|_| {
                Error::Config(format!(
                    "{ENV_REQUEST_TIMEOUT_MS} must be a number of milliseconds (got '{raw}')"
                ))
            })?;
        }
        if let Some(path) = normalize_text_option(lookup(ENV_DB_PATH)) {
            self.db_path = Some(PathBuf::from(path));
        }
        self.normalize();
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.api_url) {
            return Err(Error::Config(format!(
                "API URL must include http:// or https:// (got '{}')",
                self.api_url
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn resolve_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_db_path)
    }

    fn normalize(&mut self) {
        self.api_url = normalize_base_url(&self.api_url);
    }
}
