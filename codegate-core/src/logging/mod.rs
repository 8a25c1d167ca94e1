//! Logging setup over `tracing-subscriber`
//!
//! Library code only emits `tracing` events; binaries call
//! [`init_logging_with_config`] once at startup. Output goes to stderr so
//! command results on stdout stay machine readable.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

/// Configuration for the logging subsystem
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub with_target: bool,
    pub json_format: bool,
    /// Extra `EnvFilter` directives, e.g. `r2d2=warn`
    pub directives: Vec<String>,
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self { level, with_target: true, ..Default::default() }
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Build from the `[logging]` section of the application config
    pub fn from_config(config: &LoggingConfig) -> Result<Self, LoggingError> {
        Ok(Self::new(config.level.parse()?)
            .with_target(config.with_target)
            .json_format(config.json_format))
    }

    /// `RUST_LOG` wins when set; otherwise the configured level plus directives
    fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }

        let directives = std::iter::once(self.level.as_str().to_string())
            .chain(self.directives.iter().cloned())
            .collect::<Vec<_>>()
            .join(",");

        EnvFilter::try_new(&directives).map_err(|e| LoggingError::InvalidConfiguration(e.to_string()))
    }
}

/// Initialize logging at `info` with plain output
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::new(LogLevel::Info))
}

/// Install the global subscriber; fails if one is already installed
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter = config.env_filter()?;

    let fmt_layer = fmt::layer().with_target(config.with_target).with_writer(std::io::stderr);

    let installed = if config.json_format {
        tracing_subscriber::registry().with(env_filter).with(fmt_layer.json()).try_init()
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init()
    };

    installed.map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new(LogLevel::Debug)
            .with_target(false)
            .json_format(true)
            .directive("r2d2=warn");

        assert_eq!(config.level, LogLevel::Debug);
        assert!(!config.with_target);
        assert!(config.json_format);
        assert_eq!(config.directives, vec!["r2d2=warn".to_string()]);
    }

    #[test]
    fn test_from_app_config() {
        let app = LoggingConfig { level: "warn".to_string(), json_format: true, with_target: false };

        let config = LogConfig::from_config(&app).unwrap();
        assert_eq!(config.level, LogLevel::Warn);
        assert!(config.json_format);
        assert!(!config.with_target);
    }

    #[test]
    fn test_from_app_config_rejects_unknown_level() {
        let app = LoggingConfig { level: "chatty".to_string(), ..LoggingConfig::default() };
        assert!(matches!(
            LogConfig::from_config(&app),
            Err(LoggingError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_second_init_fails() {
        // Whichever call installs first wins; at least one must be refused
        let first = init_logging_with_config(LogConfig::new(LogLevel::Error));
        let second = init_logging_with_config(LogConfig::new(LogLevel::Error));
        assert!(first.is_err() || second.is_err());
    }
}
