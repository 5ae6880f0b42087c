//! Application configuration management.
//!
//! Holds the API and app base URLs, the route-guard paths, and the session
//! timing knobs. Configuration is stored at `~/.config/careerdesk/config.json`;
//! a missing file means defaults. `CAREERDESK_API_URL` overrides the API URL.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::guard::{FORGOT_PASSWORD_PATH, HOME_PATH, SIGN_IN_PATH};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "careerdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_url`
pub const API_URL_ENV: &str = "CAREERDESK_API_URL";

const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Origin the back-office pages are served from
const DEFAULT_APP_URL: &str = "http://localhost:3000";

/// Seconds between periodic expiry checks
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// Longest allowed gap between expiry checks (one day)
pub const MAX_CHECK_INTERVAL_SECS: u64 = 86_400;

/// Lifetime of the token cookie written at sign-in
const DEFAULT_COOKIE_MAX_AGE_DAYS: i64 = 7;

/// Browsers cap cookie lifetimes at 400 days
pub const MAX_COOKIE_MAX_AGE_DAYS: i64 = 400;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub app_url: String,
    pub sign_in_path: String,
    pub home_path: String,
    pub public_paths: Vec<String>,
    pub check_interval_secs: u64,
    pub cookie_max_age_days: i64,
    /// Encrypt the durable store with a key kept in the OS keychain
    pub encrypt_store: bool,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            app_url: DEFAULT_APP_URL.to_string(),
            sign_in_path: SIGN_IN_PATH.to_string(),
            home_path: HOME_PATH.to_string(),
            public_paths: vec![SIGN_IN_PATH.to_string(), FORGOT_PASSWORD_PATH.to_string()],
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            cookie_max_age_days: DEFAULT_COOKIE_MAX_AGE_DAYS,
            encrypt_store: true,
            last_email: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api_url = url;
            }
        }
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the durable store, the cookie jar and logs
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Seconds between expiry checks, kept within 1 s and one day
    pub fn check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.check_interval_secs.clamp(1, MAX_CHECK_INTERVAL_SECS))
    }

    /// Token cookie lifetime, kept within 0 and 400 days
    pub fn cookie_max_age(&self) -> chrono::Duration {
        chrono::Duration::days(self.cookie_max_age_days.clamp(0, MAX_COOKIE_MAX_AGE_DAYS))
    }
}
