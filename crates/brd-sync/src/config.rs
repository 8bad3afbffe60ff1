//! Engine configuration

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delay between job status checks
    pub poll_interval_ms: u64,
    /// Status checks before a job is abandoned
    pub max_poll_attempts: u32,
    /// How long the view should keep a change highlighted
    pub highlight_duration_ms: u64,
    /// Maximum cached entity snapshots
    pub cache_capacity: u64,
    /// Broadcast buffer for engine events
    pub event_capacity: usize,
}

impl SyncConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// Returns `SyncError::Config` on malformed TOML or invalid values
    pub fn from_toml_str(text: &str) -> Result<Self, SyncError> {
        let config: Self = toml::from_str(text).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns `SyncError::Config` when the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// Returns `SyncError::Config` if serialization fails
    pub fn to_toml_string(&self) -> Result<String, SyncError> {
        toml::to_string_pretty(self).map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Reject values the engine cannot run with
    ///
    /// # Errors
    /// Returns `SyncError::Config` naming the first offending key
    pub fn validate(&self) -> Result<(), SyncError> {
        let zero = [
            ("poll_interval_ms", self.poll_interval_ms == 0),
            ("max_poll_attempts", self.max_poll_attempts == 0),
            ("cache_capacity", self.cache_capacity == 0),
            ("event_capacity", self.event_capacity == 0),
        ];
        match zero.iter().find(|(_, is_zero)| *is_zero) {
            Some((key, _)) => Err(SyncError::Config(format!("{key} must be greater than zero"))),
            None => Ok(()),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_highlight_duration(mut self, duration: Duration) -> Self {
        self.highlight_duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity;
        self
    }

    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[inline]
    #[must_use]
    pub fn highlight_duration(&self) -> Duration {
        Duration::from_millis(self.highlight_duration_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3_000,
            max_poll_attempts: 40,
            highlight_duration_ms: 4_000,
            cache_capacity: 512,
            event_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = SyncConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml_str("max_poll_attempts = 5\n").unwrap();
        assert_eq!(config.max_poll_attempts, 5);
        assert_eq!(config.poll_interval_ms, 3_000);
    }

    #[test]
    fn zero_values_are_rejected() {
        let err = SyncConfig::from_toml_str("poll_interval_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn load_from_file_and_render() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "highlight_duration_ms = 1500").unwrap();

        let config = SyncConfig::load(file.path()).unwrap();
        assert_eq!(config.highlight_duration(), Duration::from_millis(1500));

        let rendered = config.to_toml_string().unwrap();
        assert_eq!(SyncConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn builder_methods() {
        let config = SyncConfig::new()
            .with_poll_interval(Duration::from_millis(250))
            .with_max_poll_attempts(3)
            .with_highlight_duration(Duration::from_secs(2))
            .with_cache_capacity(8);
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.highlight_duration_ms, 2_000);
        assert_eq!(config.max_poll_attempts, 3);
        assert_eq!(config.cache_capacity, 8);
    }
}
