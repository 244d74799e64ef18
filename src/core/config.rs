// Configuration for the Deriv Signals pipeline
// JSON file loading with defaults matching the public Deriv demo endpoint

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

// ============================================================================
// Feed Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Deriv application id appended to the websocket URL.
    pub app_id: String,
    pub ws_url: String,

    /// Fixed delay between reconnection attempts. Retried indefinitely.
    pub reconnect_delay_secs: u64,

    /// Period of the signal evaluation timer.
    pub signal_interval_secs: u64,

    /// Timeout for a single historical candles request.
    pub history_timeout_secs: u64,

    /// Number of candles requested when backfilling a freshly subscribed
    /// symbol.
    pub history_count: usize,

    /// Bounded history caps per symbol.
    pub max_candles: usize,
    pub max_signals: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            app_id: "1089".to_string(),
            ws_url: "wss://ws.derivws.com/websockets/v3".to_string(),
            reconnect_delay_secs: 2,
            signal_interval_secs: 30,
            history_timeout_secs: 5,
            history_count: 500,
            max_candles: 500,
            max_signals: 200,
        }
    }
}

impl FeedConfig {
    /// Full websocket endpoint including the app id query parameter.
    pub fn endpoint(&self) -> String {
        format!("{}?app_id={}", self.ws_url, self.app_id)
    }

    /// Load configuration from a JSON file. Missing fields fall back to the
    /// defaults, so partial override files are fine.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: FeedConfig = serde_json::from_str(&content)?;
        config.validate()?;
        info!(path = %path.as_ref().display(), "Configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ws_url.is_empty() {
            return Err(ConfigError::Validation("ws_url must not be empty".into()));
        }
        if !self.ws_url.starts_with("ws://") && !self.ws_url.starts_with("wss://") {
            return Err(ConfigError::Validation(format!(
                "ws_url must be a websocket URL, got '{}'",
                self.ws_url
            )));
        }
        if self.reconnect_delay_secs == 0 {
            return Err(ConfigError::Validation(
                "reconnect_delay_secs must be > 0".into(),
            ));
        }
        if self.signal_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "signal_interval_secs must be > 0".into(),
            ));
        }
        if self.max_candles == 0 || self.max_signals == 0 {
            return Err(ConfigError::Validation(
                "history caps must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FeedConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoint(), "wss://ws.derivws.com/websockets/v3?app_id=1089");
    }

    #[test]
    fn test_validation_rejects_bad_url() {
        let config = FeedConfig {
            ws_url: "http://example.com".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_partial_file_overrides() {
        let dir = std::env::temp_dir();
        let path = dir.join("deriv_signals_config_test.json");
        fs::write(&path, r#"{"app_id": "9999", "signal_interval_secs": 10}"#).unwrap();

        let config = FeedConfig::from_file(&path).unwrap();
        assert_eq!(config.app_id, "9999");
        assert_eq!(config.signal_interval_secs, 10);
        // Untouched fields keep their defaults
        assert_eq!(config.reconnect_delay_secs, 2);
        assert_eq!(config.max_candles, 500);

        let _ = fs::remove_file(&path);
    }
}
