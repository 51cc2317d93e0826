//! Feed configuration.
//!
//! Values resolve in layers: built-in defaults, then the TOML file, then
//! `APOD_*` environment variables (a `.env` file is honoured), then CLI flags.
//!
//! # Example Configuration
//!
//! ```toml
//! api_key = "DEMO_KEY"
//! cache_capacity = 1000
//! page_days = 5
//! stall_after_secs = 10
//! preload_media = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::feed::pagination::PaginationSettings;
use crate::likes::LikedSet;

pub const DEFAULT_API_KEY: &str = "DEMO_KEY";
pub const DEFAULT_BASE_URL: &str = "https://api.nasa.gov/planetary/apod";
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Errors that can occur when loading or saving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub api_key: String,
    pub base_url: String,
    /// Maximum number of days held in memory.
    pub cache_capacity: usize,
    /// Days fetched per page.
    pub page_days: u32,
    /// Seconds before a pending page raises the slow-network notice.
    pub stall_after_secs: u64,
    /// Seconds a notice stays visible.
    pub notice_ttl_secs: u64,
    pub request_timeout_secs: u64,
    /// Warm media for newly fetched days.
    pub preload_media: bool,
    pub preload_timeout_secs: u64,
    /// Where liked days are stored; the platform data dir if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes_path: Option<PathBuf>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_key: DEFAULT_API_KEY.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            page_days: 5,
            stall_after_secs: 10,
            notice_ttl_secs: 5,
            request_timeout_secs: 30,
            preload_media: true,
            preload_timeout_secs: 10,
            likes_path: None,
        }
    }
}

impl FeedConfig {
    /// Load from the default location, then apply the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::read_file(&Self::config_path()?)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific path, then apply the environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML without consulting the environment.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Get the default configuration file path.
    ///
    /// Uses XDG conventions:
    /// - Primary: `$XDG_CONFIG_HOME/apod/config.toml`
    /// - Fallback: platform-specific config dir
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(xdg_config) = dotenvy::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config).join("apod").join("config.toml"));
        }

        dirs::config_dir()
            .map(|p| p.join("apod").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Overlay `APOD_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = dotenvy::var("APOD_API_KEY") {
            self.api_key = val;
        }
        if let Ok(val) = dotenvy::var("APOD_BASE_URL") {
            self.base_url = val;
        }
        if let Ok(val) = dotenvy::var("APOD_CACHE_CAPACITY") {
            self.cache_capacity = parse_env("APOD_CACHE_CAPACITY", &val)?;
        }
        if let Ok(val) = dotenvy::var("APOD_PAGE_DAYS") {
            self.page_days = parse_env("APOD_PAGE_DAYS", &val)?;
        }
        if let Ok(val) = dotenvy::var("APOD_STALL_SECS") {
            self.stall_after_secs = parse_env("APOD_STALL_SECS", &val)?;
        }
        if let Ok(val) = dotenvy::var("APOD_LIKES_PATH")
            && !val.trim().is_empty()
        {
            self.likes_path = Some(PathBuf::from(val));
        }
        if let Ok(val) = dotenvy::var("APOD_PRELOAD_MEDIA") {
            self.preload_media = match val.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::Env {
                        var: "APOD_PRELOAD_MEDIA",
                        value: val,
                    });
                }
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Validation("api_key cannot be empty".into()));
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Validation("base_url cannot be empty".into()));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::Validation(
                "cache_capacity must be at least 1".into(),
            ));
        }
        if self.page_days == 0 {
            return Err(ConfigError::Validation("page_days must be at least 1".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn preload_timeout(&self) -> Duration {
        Duration::from_secs(self.preload_timeout_secs.max(1))
    }

    pub fn likes_path(&self) -> PathBuf {
        self.likes_path.clone().unwrap_or_else(LikedSet::default_path)
    }

    pub fn pagination_settings(&self) -> PaginationSettings {
        PaginationSettings {
            page_days: self.page_days,
            stall_after: Duration::from_secs(self.stall_after_secs),
            notice_ttl: Duration::from_secs(self.notice_ttl_secs),
        }
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}
