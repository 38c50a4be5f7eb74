//! Configuration management for Diarist

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Default maximum number of images a single post may carry
pub const DEFAULT_MAX_IMAGES_PER_POST: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub authoring: AuthoringConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthoringConfig {
    #[serde(default = "default_max_images_per_post")]
    pub max_images_per_post: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further attempt
    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,
}

fn default_timeout() -> String {
    "30s".to_string()
}

fn default_max_images_per_post() -> usize {
    DEFAULT_MAX_IMAGES_PER_POST
}

fn default_poll_interval() -> String {
    "2s".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> String {
    "1s".to_string()
}

impl Default for AuthoringConfig {
    fn default() -> Self {
        Self {
            max_images_per_post: default_max_images_per_post(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
        }
    }
}

impl BackendConfig {
    /// Request timeout for backend calls
    pub fn timeout(&self) -> Result<Duration> {
        parse_duration_field("backend.timeout", &self.timeout)
    }
}

impl PollingConfig {
    /// Delay between two upload-status polls
    pub fn interval(&self) -> Result<Duration> {
        parse_duration_field("polling.interval", &self.interval)
    }
}

impl UploadsConfig {
    /// Backoff base for destination-request retries
    pub fn retry_delay(&self) -> Result<Duration> {
        parse_duration_field("uploads.retry_delay", &self.retry_delay)
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration pointing at a backend, with defaults everywhere else
    pub fn for_backend(base_url: impl Into<String>) -> Self {
        Self {
            backend: BackendConfig {
                base_url: base_url.into(),
                api_key: None,
                timeout: default_timeout(),
            },
            authoring: AuthoringConfig::default(),
            polling: PollingConfig::default(),
            uploads: UploadsConfig::default(),
        }
    }

    /// Check values that the TOML schema alone cannot express
    pub fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::MissingField("backend.base_url".to_string()).into());
        }
        if self.authoring.max_images_per_post == 0 {
            return Err(ConfigError::Invalid {
                field: "authoring.max_images_per_post".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.uploads.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "uploads.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        self.backend.timeout()?;
        self.polling.interval()?;
        self.uploads.retry_delay()?;
        Ok(())
    }
}

fn parse_duration_field(field: &str, value: &str) -> Result<Duration> {
    let duration = humantime::parse_duration(value).map_err(|e| ConfigError::Invalid {
        field: field.to_string(),
        reason: format!("expected a duration like \"2s\" ({})", e),
    })?;

    if duration.is_zero() {
        return Err(ConfigError::Invalid {
            field: field.to_string(),
            reason: "must be greater than zero".to_string(),
        }
        .into());
    }

    Ok(duration)
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("DIARIST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("diarist").join("config.toml"))
}
