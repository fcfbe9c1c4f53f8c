//! Configuration management for thermorig
//!
//! This module handles loading, validation, and management of the
//! application configuration from YAML files.

use crate::error::{Result, ThermorigError};
use crate::registers::{Channel, MeterFamily};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial bus parameters
    pub serial: SerialConfig,

    /// Meter family and bus addressing
    pub meter: MeterConfig,

    /// Polling cadence, retry and reconnection policy
    pub acquisition: AcquisitionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Serial port parameters for the RS-485 bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial device path (e.g. /dev/ttyUSB0, COM3)
    pub port: String,

    /// Baud rate
    pub baud_rate: u32,

    /// Data bits (5-8)
    pub data_bits: u8,

    /// Parity: none, even or odd
    pub parity: String,

    /// Stop bits (1 or 2)
    pub stop_bits: u8,

    /// Read timeout per request in seconds
    pub timeout_secs: f64,

    /// Quiet time between requests to different channels; the bus allows
    /// one talker at a time
    pub inter_request_delay_secs: f64,

    /// Stabilization delay after opening the port
    pub post_connect_delay_secs: f64,
}

/// Meter family selection and per-channel slave addressing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Which register map to use
    pub family: MeterFamily,

    /// Slave id answering for the heater channel
    pub heater_slave_id: u8,

    /// Slave id answering for the fan channel. Equal to the heater id for
    /// the RS-PRO (phases of one meter), distinct on an SDM120 daisy chain.
    pub fan_slave_id: u8,
}

impl MeterConfig {
    /// Resolve the slave id answering for a logical channel
    pub fn slave_id(&self, channel: Channel) -> u8 {
        match channel {
            Channel::Heater => self.heater_slave_id,
            Channel::Fan => self.fan_slave_id,
        }
    }
}

/// Polling cadence, retry and reconnection policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Sample interval used when the caller does not specify one
    pub default_sample_interval_secs: u64,

    /// Attempts per logical field read
    pub max_retries: u32,

    /// Base delay between field-read retries in seconds
    pub retry_delay_secs: f64,

    /// Whole-cycle failures tolerated before forcing a reconnect
    pub max_consecutive_failures: u32,

    /// Reconnect-failure backoff, as a multiple of the sample interval
    pub reconnect_backoff_factor: u32,

    /// Grace period when joining the polling task on stop
    pub stop_grace_secs: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file (or directory for the rolling appender)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            data_bits: 8,
            parity: "none".to_string(),
            stop_bits: 1,
            timeout_secs: 1.0,
            inter_request_delay_secs: 0.2,
            post_connect_delay_secs: 0.5,
        }
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            family: MeterFamily::RsPro,
            heater_slave_id: 1,
            fan_slave_id: 1,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            default_sample_interval_secs: 5,
            max_retries: 3,
            retry_delay_secs: 0.5,
            max_consecutive_failures: 10,
            reconnect_backoff_factor: 2,
            stop_grace_secs: 2.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/thermorig.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            meter: MeterConfig::default(),
            acquisition: AcquisitionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SerialConfig {
    /// Read timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }

    /// Inter-request quiet time as a `Duration`
    pub fn inter_request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.inter_request_delay_secs)
    }

    /// Post-connect stabilization delay as a `Duration`
    pub fn post_connect_delay(&self) -> Duration {
        Duration::from_secs_f64(self.post_connect_delay_secs)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations, falling back to
    /// built-in defaults when no file exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "thermorig_config.yaml",
            "/data/thermorig_config.yaml",
            "/etc/thermorig/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(ThermorigError::validation(
                "serial.port",
                "Serial port path cannot be empty",
            ));
        }

        if self.serial.baud_rate == 0 {
            return Err(ThermorigError::validation(
                "serial.baud_rate",
                "Baud rate must be greater than 0",
            ));
        }

        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(ThermorigError::validation(
                "serial.data_bits",
                "Data bits must be between 5 and 8",
            ));
        }

        match self.serial.parity.to_lowercase().as_str() {
            "none" | "n" | "even" | "e" | "odd" | "o" => {}
            _ => {
                return Err(ThermorigError::validation(
                    "serial.parity",
                    "Parity must be none, even or odd",
                ));
            }
        }

        if !(1..=2).contains(&self.serial.stop_bits) {
            return Err(ThermorigError::validation(
                "serial.stop_bits",
                "Stop bits must be 1 or 2",
            ));
        }

        if self.serial.timeout_secs <= 0.0 {
            return Err(ThermorigError::validation(
                "serial.timeout_secs",
                "Timeout must be positive",
            ));
        }

        if self.acquisition.default_sample_interval_secs == 0 {
            return Err(ThermorigError::validation(
                "acquisition.default_sample_interval_secs",
                "Sample interval must be at least 1 second",
            ));
        }

        if self.acquisition.max_retries == 0 {
            return Err(ThermorigError::validation(
                "acquisition.max_retries",
                "At least one read attempt is required",
            ));
        }

        if self.acquisition.max_consecutive_failures == 0 {
            return Err(ThermorigError::validation(
                "acquisition.max_consecutive_failures",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.meter.family, MeterFamily::RsPro);
        assert_eq!(config.meter.slave_id(Channel::Fan), 1);
        assert_eq!(config.acquisition.default_sample_interval_secs, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.serial.port = String::new();
        assert!(config.validate().is_err());

        config = Config::default();
        config.serial.parity = "mark".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.acquisition.default_sample_interval_secs = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.acquisition.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.meter.family = MeterFamily::Sdm120;
        config.meter.fan_slave_id = 2;

        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(deserialized.meter.family, MeterFamily::Sdm120);
        assert_eq!(deserialized.meter.slave_id(Channel::Fan), 2);
        assert_eq!(deserialized.serial.port, config.serial.port);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "serial:\n  port: /dev/cu.usbserial-BG01Q45C\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.serial.port, "/dev/cu.usbserial-BG01Q45C");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.acquisition.max_retries, 3);
    }
}
