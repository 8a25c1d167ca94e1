//! Configuration management for codegate
//!
//! Defaults, a TOML file, and `CODEGATE_*` environment variables, in that
//! order of precedence from lowest to highest when the CLI layers them.

use crate::logging::LogLevel;
use crate::oracle::BotApiConfig;
use crate::service::AccessPolicy;
use crate::types::{GroupId, UserId};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite store configuration
    pub store: StoreConfig,

    /// Membership oracle configuration
    pub oracle: OracleConfig,

    /// Admins and gating groups
    pub access: AccessConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file
    pub db_path: PathBuf,

    /// Maximum pooled connections
    pub pool_size: u32,

    /// How long a writer waits on a locked database
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

/// Oracle configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Bot API base URL
    pub api_base: String,

    /// Bot token; required by commands that reach the platform
    pub bot_token: Option<String>,

    /// Transport timeout per HTTP request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Budget for one oracle call, after which it counts as failed
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
}

/// Access configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Users allowed to manage groups and content
    pub admin_ids: Vec<i64>,

    /// Groups required in addition to the group directory
    pub required_groups: Vec<i64>,

    /// Group that holds mirrored copies of registered artifacts
    pub storage_group: Option<i64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn or warning, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./codegate.db"),
            pool_size: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            bot_token: None,
            request_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(5),
        }
    }
}

// Keeps the token out of debug output
impl fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConfig")
            .field("api_base", &self.api_base)
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json_format: false, with_target: true }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("{key}: {e}")))
}

/// Comma separated ids; blank entries are skipped
fn parse_id_list(key: &str, raw: &str) -> Result<Vec<i64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_value(key, s))
        .collect()
}

impl Config {
    /// Load configuration from environment variables over the defaults
    ///
    /// Variables use the `CODEGATE_` prefix, e.g. `CODEGATE_DB_PATH=/var/lib/codegate.db`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `CODEGATE_*` variables supplied by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Store config
        if let Some(path) = lookup("CODEGATE_DB_PATH") {
            self.store.db_path = PathBuf::from(path);
        }
        if let Some(size) = lookup("CODEGATE_POOL_SIZE") {
            self.store.pool_size = parse_value("CODEGATE_POOL_SIZE", &size)?;
        }

        // Oracle config
        if let Some(token) = lookup("CODEGATE_BOT_TOKEN") {
            self.oracle.bot_token = Some(token.trim().to_string()).filter(|t| !t.is_empty());
        }
        if let Some(base) = lookup("CODEGATE_API_BASE") {
            self.oracle.api_base = base.trim().to_string();
        }
        if let Some(timeout) = lookup("CODEGATE_ORACLE_TIMEOUT") {
            self.oracle.call_timeout = humantime::parse_duration(timeout.trim()).map_err(|e| {
                ConfigError::InvalidValue(format!("CODEGATE_ORACLE_TIMEOUT: {e}"))
            })?;
        }

        // Access config
        if let Some(ids) = lookup("CODEGATE_ADMIN_IDS") {
            self.access.admin_ids = parse_id_list("CODEGATE_ADMIN_IDS", &ids)?;
        }
        if let Some(groups) = lookup("CODEGATE_REQUIRED_GROUPS") {
            self.access.required_groups = parse_id_list("CODEGATE_REQUIRED_GROUPS", &groups)?;
        }
        if let Some(group) = lookup("CODEGATE_STORAGE_GROUP") {
            self.access.storage_group = if group.trim().is_empty() {
                None
            } else {
                Some(parse_value("CODEGATE_STORAGE_GROUP", &group)?)
            };
        }

        // Logging config
        if let Some(level) = lookup("CODEGATE_LOG_LEVEL") {
            self.logging.level = level.trim().to_lowercase();
        }
        if let Some(json) = lookup("CODEGATE_LOG_JSON") {
            self.logging.json_format = parse_value("CODEGATE_LOG_JSON", &json)?;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.pool_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "pool_size must be greater than 0".to_string(),
            ));
        }

        if self.oracle.call_timeout.is_zero() || self.oracle.request_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "oracle timeouts must be greater than 0".to_string(),
            ));
        }

        if self.oracle.api_base.is_empty() {
            return Err(ConfigError::ValidationFailed("api_base cannot be empty".to_string()));
        }

        if self.logging.level.parse::<LogLevel>().is_err() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }

    /// Bot API settings; fails when no token is configured
    pub fn bot_api(&self) -> Result<BotApiConfig, ConfigError> {
        let token = self.oracle.bot_token.clone().ok_or(ConfigError::Missing("bot_token"))?;

        Ok(BotApiConfig {
            api_base: self.oracle.api_base.clone(),
            token,
            request_timeout: self.oracle.request_timeout,
        })
    }

    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            admin_ids: self.access.admin_ids.iter().copied().map(UserId).collect(),
            required_groups: self.access.required_groups.iter().copied().map(GroupId).collect(),
            storage_group: self.access.storage_group.map(GroupId),
            oracle_timeout: self.oracle.call_timeout,
        }
    }
}
