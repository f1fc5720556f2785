/*!
 * Configuration management for AVLink.
 *
 * This module provides functionality to load, validate, and access
 * application-level settings for AVLink components. Per-device settings
 * live in the device descriptors, not here.
 */
use std::path::Path;
use std::sync::Arc;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Application configuration for AVLink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Device handling defaults
    #[serde(default)]
    pub devices: DeviceDefaults,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Defaults applied to device coordinators when the descriptor is silent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDefaults {
    /// Seconds between periodic state refresh ticks
    #[serde(default = "default_poll_tick_secs")]
    pub poll_tick_secs: u64,

    /// Seconds between reconnect attempts
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,

    /// Default reply timeout for synchronous commands, in seconds
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: f64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_tick_secs() -> u64 {
    30
}

fn default_reconnect_secs() -> u64 {
    30
}

fn default_reply_timeout_secs() -> f64 {
    2.0
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for DeviceDefaults {
    fn default() -> Self {
        Self {
            poll_tick_secs: default_poll_tick_secs(),
            reconnect_secs: default_reconnect_secs(),
            reply_timeout_secs: default_reply_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            devices: DeviceDefaults::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file with an `AVLINK_` environment overlay
    ///
    /// Environment variables take precedence over file values, e.g.
    /// `AVLINK_LOGGING__LEVEL=debug`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());

        let config = ConfigLib::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("AVLINK").separator("__"))
            .build()
            .map_err(|e| Error::config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| Error::config(e.to_string()))
    }
}

/// A reference-counted configuration
pub type SharedConfig = Arc<Config>;
