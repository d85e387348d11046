//! Configuration management for the serial MIDI bridge
//!
//! Handles loading, validating and hot-reloading the YAML configuration.
//! Every section is optional; a missing file means "all defaults".

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

pub use watcher::ConfigWatcher;

use crate::transport::DEFAULT_BAUD_RATE;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial side of the bridge
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SerialConfig {
    /// Device path (e.g. `/dev/cu.usbmodem14101`, `COM3`). Auto-selected when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Case-insensitive patterns matched against device path and description
    #[serde(default = "default_serial_patterns")]
    pub auto_select: Vec<String>,
}

/// MIDI side of the bridge
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MidiConfig {
    /// Output port name or substring. Auto-selected when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
    /// Case-insensitive patterns matched against output port names
    #[serde(default = "default_midi_patterns")]
    pub auto_select: Vec<String>,
}

/// Run loop tuning
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BridgeConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

/// Activity log and log file
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Print every N-th frame in the activity log
    #[serde(default = "default_frame_log_every")]
    pub frame_log_every: u64,
    /// Optional log file, in addition to the console
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            auto_select: default_serial_patterns(),
        }
    }
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            output_port: None,
            auto_select: default_midi_patterns(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            frame_log_every: default_frame_log_every(),
            file: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_yaml(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document is a valid "all defaults" config
        let config: AppConfig = if contents.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.serial.baud_rate == 0 {
            anyhow::bail!("serial.baud_rate must be greater than 0");
        }
        if let Some(port) = &self.serial.port {
            if port.trim().is_empty() {
                anyhow::bail!("serial.port cannot be empty (omit it to auto-select)");
            }
        }
        if let Some(port) = &self.midi.output_port {
            if port.trim().is_empty() {
                anyhow::bail!("midi.output_port cannot be empty (omit it to auto-select)");
            }
        }

        if !(1..=100).contains(&self.bridge.poll_interval_ms) {
            anyhow::bail!(
                "bridge.poll_interval_ms must be between 1 and 100 (got {})",
                self.bridge.poll_interval_ms
            );
        }
        if self.bridge.stop_timeout_ms == 0 {
            anyhow::bail!("bridge.stop_timeout_ms must be greater than 0");
        }
        if self.bridge.event_buffer == 0 {
            anyhow::bail!("bridge.event_buffer must be greater than 0");
        }

        if self.logging.frame_log_every == 0 {
            anyhow::bail!("logging.frame_log_every must be at least 1");
        }

        Ok(())
    }
}

// Default value functions
fn default_baud_rate() -> u32 { DEFAULT_BAUD_RATE }
fn default_serial_patterns() -> Vec<String> { vec!["usbmodem".to_string(), "arduino".to_string()] }
fn default_midi_patterns() -> Vec<String> {
    vec!["iac".to_string(), "pedals".to_string(), "loopmidi".to_string()]
}
fn default_poll_interval_ms() -> u64 { 1 }
fn default_stop_timeout_ms() -> u64 { 1000 }
fn default_event_buffer() -> usize { 1024 }
fn default_frame_log_every() -> u64 { 5 }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_document_is_default() {
        let config = AppConfig::from_yaml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.bridge.poll_interval_ms, 1);
        assert_eq!(config.logging.frame_log_every, 5);
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let yaml = r#"
serial:
  port: "/dev/cu.usbmodem14101"
midi:
  output_port: "IAC Driver Pedals"
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.serial.port.as_deref(), Some("/dev/cu.usbmodem14101"));
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.auto_select, vec!["usbmodem", "arduino"]);
        assert_eq!(config.midi.output_port.as_deref(), Some("IAC Driver Pedals"));
        assert_eq!(config.bridge.stop_timeout_ms, 1000);
    }

    #[test]
    fn test_zero_baud_rate_is_rejected() {
        let err = AppConfig::from_yaml("serial:\n  baud_rate: 0\n").unwrap_err();
        assert!(format!("{:#}", err).contains("baud_rate"));
    }

    #[test]
    fn test_poll_interval_range() {
        assert!(AppConfig::from_yaml("bridge:\n  poll_interval_ms: 0\n").is_err());
        assert!(AppConfig::from_yaml("bridge:\n  poll_interval_ms: 500\n").is_err());
        assert!(AppConfig::from_yaml("bridge:\n  poll_interval_ms: 10\n").is_ok());
    }

    #[test]
    fn test_blank_port_is_rejected() {
        assert!(AppConfig::from_yaml("midi:\n  output_port: \"\"\n").is_err());
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.yaml");

        let config = AppConfig::load_or_default(&path.to_string_lossy()).await.unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[tokio::test]
    async fn test_serialized_config_loads_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        let path = path.to_string_lossy().to_string();

        let mut config = AppConfig::default();
        config.serial.port = Some("COM3".to_string());
        config.logging.frame_log_every = 1;
        std::fs::write(&path, serde_yaml::to_string(&config).unwrap()).unwrap();

        let loaded = AppConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
    }
}
