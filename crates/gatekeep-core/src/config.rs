//! Application configuration management.
//!
//! This module handles loading and saving the auth configuration: session
//! timing, token claims, the strategy chain (remote endpoint, user directory,
//! fallback accounts), the login rate limit, and where session state lives.
//!
//! Configuration is stored at `~/.config/gatekeep/config.json`. A few
//! settings can be overridden from the environment, see [`Config::apply_env`].

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::resolver::FallbackAccount;
use crate::session::{SessionSettings, DEFAULT_SESSION_TTL_SECS, DEFAULT_WARNING_LEAD_SECS};
use crate::token::TokenSettings;

/// Application name used for config/data directory paths
const APP_NAME: &str = "gatekeep";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_REMOTE_URL: &str = "GATEKEEP_REMOTE_URL";
pub const ENV_USER_DIRECTORY: &str = "GATEKEEP_USER_DIRECTORY";
pub const ENV_STORAGE_DIR: &str = "GATEKEEP_STORAGE_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity timeout. Issued tokens live exactly as long.
    pub ttl_secs: u64,
    pub warning_lead_secs: u64,
    pub refresh_threshold_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
            warning_lead_secs: DEFAULT_WARNING_LEAD_SECS,
            refresh_threshold_secs: 5 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub issuer: String,
    pub audience: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        let defaults = TokenSettings::default();
        Self {
            issuer: defaults.issuer,
            audience: defaults.audience,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub login_path: String,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            login_path: "/api/auth/login".to_string(),
            timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_attempts: usize,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub token: TokenConfig,
    pub remote: Option<RemoteConfig>,
    pub user_directory: Option<PathBuf>,
    pub fallback_accounts: Vec<FallbackAccount>,
    pub rate_limit: RateLimitConfig,
    pub storage_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Overlay settings from `GATEKEEP_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_REMOTE_URL) {
            let remote = self.remote.get_or_insert_with(RemoteConfig::default);
            remote.base_url = url;
        }
        if let Some(path) = non_empty(ENV_USER_DIRECTORY) {
            self.user_directory = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty(ENV_STORAGE_DIR) {
            self.storage_dir = Some(PathBuf::from(path));
        }
    }

    /// Directory holding the persisted token, user, and session state
    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Reject session timings the session manager and token service cannot honour
    pub fn validate(&self) -> Result<()> {
        let session = &self.session;
        if session.ttl_secs == 0 {
            bail!("session.ttl_secs must be greater than zero");
        }
        if session.warning_lead_secs >= session.ttl_secs {
            bail!(
                "session.warning_lead_secs ({}) must be less than session.ttl_secs ({})",
                session.warning_lead_secs,
                session.ttl_secs
            );
        }
        if session.refresh_threshold_secs >= session.ttl_secs {
            bail!(
                "session.refresh_threshold_secs ({}) must be less than session.ttl_secs ({})",
                session.refresh_threshold_secs,
                session.ttl_secs
            );
        }
        self.token_settings()?;
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            ttl: Duration::from_secs(self.session.ttl_secs),
            warning_lead: Duration::from_secs(self.session.warning_lead_secs),
        }
    }

    pub fn token_settings(&self) -> Result<TokenSettings> {
        Ok(TokenSettings {
            ttl: seconds(self.session.ttl_secs, "session.ttl_secs")?,
            refresh_threshold: seconds(
                self.session.refresh_threshold_secs,
                "session.refresh_threshold_secs",
            )?,
            issuer: self.token.issuer.clone(),
            audience: self.token.audience.clone(),
        })
    }
}

fn seconds(secs: u64, field: &str) -> Result<chrono::Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| anyhow::anyhow!("{} is out of range: {}", field, secs))
}
