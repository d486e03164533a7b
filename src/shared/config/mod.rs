//! Application configuration module
//!
//! Provides configuration types for the chat core. Values can come from the
//! builder, a TOML file, or defaults; `XFCHAT_USER_ID` overrides the user id.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default upper bound for a single page of query results
pub const DEFAULT_MAX_QUERY_LIMIT: u32 = 100;
/// Default window during which repeated keystrokes are not re-sent
pub const DEFAULT_KEYSTROKE_WINDOW_MS: u64 = 3_000;
/// Default lifetime of a remote user's typing indicator
pub const DEFAULT_TYPING_EXPIRY_MS: u64 = 5_000;

/// Retry settings for remote calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
            jitter: 0.1,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Id of the user the client acts as
    pub user_id: String,
    /// Retry settings
    pub retry: RetryConfig,
    /// Keystroke de-duplication window
    pub keystroke_window_ms: u64,
    /// Expiry for typing indicators received from other users
    pub typing_expiry_ms: u64,
    /// Maximum page size for queries
    pub max_query_limit: u32,
    /// Where the local store snapshot lives; `None` uses the platform data dir
    pub store_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_id: "local-user".to_string(),
            retry: RetryConfig::default(),
            keystroke_window_ms: DEFAULT_KEYSTROKE_WINDOW_MS,
            typing_expiry_ms: DEFAULT_TYPING_EXPIRY_MS,
            max_query_limit: DEFAULT_MAX_QUERY_LIMIT,
            store_path: None,
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Parse a TOML document; missing keys fall back to defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let mut config: AppConfig =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    fn apply_env(&mut self) {
        if let Ok(user_id) = std::env::var("XFCHAT_USER_ID") {
            if !user_id.is_empty() {
                self.user_id = user_id;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::MissingValue("user_id"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(ConfigError::InvalidValue {
                field: "retry.jitter",
                message: format!("{} is outside 0.0..=1.0", self.retry.jitter),
            });
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "retry.base_delay_ms",
                message: "must not exceed retry.max_delay_ms".to_string(),
            });
        }
        Ok(())
    }

    /// Resolved location of the store snapshot
    pub fn store_path(&self) -> PathBuf {
        match &self.store_path {
            Some(path) => path.clone(),
            None => {
                let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
                path.push("xfchat");
                path.push("local_store.json");
                path
            }
        }
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    user_id: Option<String>,
    retry: Option<RetryConfig>,
    keystroke_window_ms: Option<u64>,
    typing_expiry_ms: Option<u64>,
    max_query_limit: Option<u32>,
    store_path: Option<PathBuf>,
}

impl AppConfigBuilder {
    /// Set the acting user id
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the retry configuration
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn keystroke_window_ms(mut self, window: u64) -> Self {
        self.keystroke_window_ms = Some(window);
        self
    }

    pub fn typing_expiry_ms(mut self, expiry: u64) -> Self {
        self.typing_expiry_ms = Some(expiry);
        self
    }

    pub fn max_query_limit(mut self, limit: u32) -> Self {
        self.max_query_limit = Some(limit);
        self
    }

    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let defaults = AppConfig::default();
        let config = AppConfig {
            user_id: self.user_id.unwrap_or(defaults.user_id),
            retry: self.retry.unwrap_or(defaults.retry),
            keystroke_window_ms: self
                .keystroke_window_ms
                .unwrap_or(defaults.keystroke_window_ms),
            typing_expiry_ms: self.typing_expiry_ms.unwrap_or(defaults.typing_expiry_ms),
            max_query_limit: self.max_query_limit.unwrap_or(defaults.max_query_limit),
            store_path: self.store_path.or(defaults.store_path),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("failed to read config: {0}")]
    Io(String),
}
