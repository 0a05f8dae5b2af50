//! Configuration types for the Digital Twin client
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Interval between polls while destroy waits for in-flight callbacks (ms)
    #[serde(default = "default_callback_poll_interval_ms")]
    pub callback_poll_interval_ms: u64,

    /// Report SDK information after a successful registration
    #[serde(default = "default_report_sdk_info")]
    pub report_sdk_info: bool,

    /// SDK information reported to the service
    #[serde(default)]
    pub sdk_info: SdkInfo,

    /// Capacity of the lifecycle event channel
    ///
    /// Events beyond this capacity are dropped with a warning.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ClientConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            callback_poll_interval_ms: default_callback_poll_interval_ms(),
            report_sdk_info: default_report_sdk_info(),
            sdk_info: SdkInfo::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self, crate::Error> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| crate::Error::config(format!("Invalid configuration JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.callback_poll_interval_ms == 0 {
            return Err(crate::Error::config(
                "callback_poll_interval_ms must be > 0",
            ));
        }

        if self.callback_poll_interval_ms > 1000 {
            return Err(crate::Error::config(format!(
                "callback_poll_interval_ms must be <= 1000. Got: {}",
                self.callback_poll_interval_ms
            )));
        }

        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }

        self.sdk_info.validate()?;

        Ok(())
    }

    /// Poll interval as a [`Duration`]
    pub fn callback_poll_interval(&self) -> Duration {
        Duration::from_millis(self.callback_poll_interval_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// SDK information reported as properties of the SDK-information interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkInfo {
    /// Implementation language
    #[serde(default = "default_sdk_language")]
    pub language: String,

    /// SDK version
    #[serde(default = "default_sdk_version")]
    pub version: String,

    /// SDK vendor
    #[serde(default = "default_sdk_vendor")]
    pub vendor: String,
}

impl SdkInfo {
    /// Validate the SDK information
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.language.is_empty() {
            return Err(crate::Error::config("sdk_info.language cannot be empty"));
        }
        if self.version.is_empty() {
            return Err(crate::Error::config("sdk_info.version cannot be empty"));
        }
        if self.vendor.is_empty() {
            return Err(crate::Error::config("sdk_info.vendor cannot be empty"));
        }
        Ok(())
    }
}

impl Default for SdkInfo {
    fn default() -> Self {
        Self {
            language: default_sdk_language(),
            version: default_sdk_version(),
            vendor: default_sdk_vendor(),
        }
    }
}

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    /// In-process loopback hub
    Loopback {
        /// Callback delivery mode
        #[serde(default)]
        mode: LoopbackMode,
        /// Delay before sends are acknowledged (ms)
        #[serde(default)]
        ack_latency_ms: u64,
    },

    /// Custom transport
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl TransportConfig {
    /// Name of the factory that handles this configuration
    pub fn factory_name(&self) -> &str {
        match self {
            TransportConfig::Loopback { .. } => "loopback",
            TransportConfig::Custom { factory, .. } => factory,
        }
    }

    /// Validate the transport configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            TransportConfig::Loopback { ack_latency_ms, .. } => {
                if *ack_latency_ms > 60_000 {
                    return Err(crate::Error::config(
                        "Loopback ack_latency_ms must be <= 60000",
                    ));
                }
                Ok(())
            }
            TransportConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom transport factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom transport config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Loopback {
            mode: LoopbackMode::default(),
            ack_latency_ms: 0,
        }
    }
}

/// How the loopback transport delivers callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopbackMode {
    /// Callbacks on tokio tasks
    #[default]
    Threaded,
    /// Callbacks only from `do_work`
    Cooperative,
}

fn default_callback_poll_interval_ms() -> u64 {
    10
}

fn default_report_sdk_info() -> bool {
    true
}

fn default_event_channel_capacity() -> usize {
    100
}

fn default_sdk_language() -> String {
    "Rust".to_string()
}

fn default_sdk_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_sdk_vendor() -> String {
    "DigitalTwin Lab".to_string()
}
