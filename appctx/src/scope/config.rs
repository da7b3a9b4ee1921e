//! Scope runner configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`ScopeRunner`](super::ScopeRunner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Report the scope's context id in its metadata.
    #[serde(default = "default_true")]
    pub expose_id: bool,

    /// Log a `request.timer` metric through the scope's logger.
    #[serde(default = "default_true")]
    pub log_timing: bool,

    /// How long a hijacked scope may run before a missing `done()` is
    /// reported, in milliseconds.
    #[serde(default = "default_hijack_grace_ms")]
    pub hijack_grace_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_hijack_grace_ms() -> u64 {
    10_000
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            expose_id: default_true(),
            log_timing: default_true(),
            hijack_grace_ms: default_hijack_grace_ms(),
        }
    }
}

impl ScopeConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the id is exposed.
    #[must_use]
    pub fn with_expose_id(mut self, expose_id: bool) -> Self {
        self.expose_id = expose_id;
        self
    }

    /// Sets whether timing is logged.
    #[must_use]
    pub fn with_log_timing(mut self, log_timing: bool) -> Self {
        self.log_timing = log_timing;
        self
    }

    /// Sets the hijack grace period.
    #[must_use]
    pub fn with_hijack_grace(mut self, grace: Duration) -> Self {
        self.hijack_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Returns the hijack grace period.
    #[must_use]
    pub fn hijack_grace(&self) -> Duration {
        Duration::from_millis(self.hijack_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config: ScopeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ScopeConfig::default());
        assert!(config.expose_id);
        assert!(config.log_timing);
        assert_eq!(config.hijack_grace(), Duration::from_secs(10));
    }

    #[test]
    fn test_builders() {
        let config = ScopeConfig::new()
            .with_expose_id(false)
            .with_log_timing(false)
            .with_hijack_grace(Duration::from_millis(250));
        assert!(!config.expose_id);
        assert!(!config.log_timing);
        assert_eq!(config.hijack_grace_ms, 250);
    }
}
