use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::backends::plex::api::RateLimitPolicy;

const APP_DIR: &str = "plex-discovery";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub selection: SelectionPolicy,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccountConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    #[serde(default = "default_plex_tv_url")]
    pub plex_tv_url: String,

    #[serde(default = "default_alternate_discovery_url")]
    pub alternate_discovery_url: Option<String>,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_default_delay_ms: u64,

    #[serde(default = "default_variant_backoff_ms")]
    pub variant_backoff_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// How long a discovered server list is served without asking plex.tv again
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

/// Which connections may be used, and in what order they are tried
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectionPolicy {
    #[serde(default = "default_true")]
    pub prefer_https: bool,

    #[serde(default = "default_true")]
    pub try_https_upgrade: bool,

    #[serde(default = "default_true")]
    pub allow_local_http: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            debug!("Loading config from {:?}", config_path);
            let contents =
                fs::read_to_string(config_path).context("Failed to read config file")?;
            let config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            info!("Config loaded successfully");
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", config_path);
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join(APP_DIR).join("config.toml"))
    }
}

impl DiscoveryConfig {
    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            max_attempts: self.max_attempts.max(1),
            default_delay: Duration::from_millis(self.rate_limit_default_delay_ms),
            variant_backoff: Duration::from_millis(self.variant_backoff_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl StorageConfig {
    /// Configured path, or `<data_dir>/plex-discovery/state.json`
    pub fn resolve_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => {
                let data_dir = dirs::data_dir().context("Failed to get data directory")?;
                Ok(data_dir.join(APP_DIR).join("state.json"))
            }
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            plex_tv_url: default_plex_tv_url(),
            alternate_discovery_url: default_alternate_discovery_url(),
            max_attempts: default_max_attempts(),
            rate_limit_default_delay_ms: default_rate_limit_delay_ms(),
            variant_backoff_ms: default_variant_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            connection_timeout_secs: default_connection_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            prefer_https: default_true(),
            try_https_upgrade: default_true(),
            allow_local_http: default_true(),
        }
    }
}

// Default value functions
fn default_plex_tv_url() -> String { "https://plex.tv/api/v2".to_string() }
fn default_alternate_discovery_url() -> Option<String> { Some("https://clients.plex.tv/api/v2".to_string()) }
fn default_max_attempts() -> u32 { 2 }
fn default_rate_limit_delay_ms() -> u64 { 2000 }
fn default_variant_backoff_ms() -> u64 { 500 }
fn default_request_timeout_secs() -> u64 { 15 }
fn default_connection_timeout_secs() -> u64 { 10 }
fn default_cache_ttl_secs() -> u64 { 300 }
fn default_true() -> bool { true }
