//! Global `tracing` subscriber setup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::errors::ContextError;

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Subscriber configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Filter directive: a level (`info`) or a full `EnvFilter` directive
    /// (`appctx=debug,warn`).
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Colored output (text format only).
    #[serde(default = "default_true")]
    pub ansi: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            ansi: default_true(),
        }
    }
}

impl TracingConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter directive.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Enables or disables colored output.
    #[must_use]
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Parses the filter directive.
    ///
    /// # Errors
    ///
    /// Returns `Tracing` if the directive is invalid.
    pub fn env_filter(&self) -> Result<EnvFilter, ContextError> {
        EnvFilter::try_new(&self.level)
            .map_err(|e| ContextError::Tracing(format!("invalid filter '{}': {e}", self.level)))
    }
}

/// Installs the global subscriber, writing to stderr.
///
/// # Errors
///
/// Returns `Tracing` if the filter is invalid or a global subscriber is
/// already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<(), ContextError> {
    let filter = config.env_filter()?;
    let base = Registry::default().with(filter);

    let installed = match config.format {
        LogFormat::Json => base
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => base
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(config.ansi)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    installed.map_err(|e| ContextError::Tracing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: TracingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TracingConfig::default());
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Text);
        assert!(config.ansi);
    }

    #[test]
    fn test_json_format_parses() {
        let config: TracingConfig =
            serde_json::from_str(r#"{"level": "appctx=debug", "format": "json", "ansi": false}"#)
                .unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.env_filter().is_ok());
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = TracingConfig::new().with_level("appctx=loud");
        let err = config.env_filter().unwrap_err();
        assert_eq!(err.kind(), "TracingError");
    }

    #[test]
    fn test_second_init_reports_error() {
        let config = TracingConfig::new().with_level("warn").with_ansi(false);
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
