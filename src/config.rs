//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub demo: DemoConfig,

    #[serde(default)]
    pub negotiation: NegotiationConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// Demo (synthetic telemetry) configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DemoConfig {
    #[serde(default = "default_demo_enabled")]
    pub enabled: bool,
}

/// Configuration negotiation timing
#[derive(Debug, Deserialize, Clone)]
pub struct NegotiationConfig {
    #[serde(default = "default_probe_window_ms")]
    pub probe_window_ms: u64,

    #[serde(default = "default_settle_window_ms")]
    pub settle_window_ms: u64,
}

/// Packet export configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyACM0".to_string() }
fn default_baud_rate() -> u32 { 115200 }

fn default_demo_enabled() -> bool { false }

fn default_probe_window_ms() -> u64 { 2000 }
fn default_settle_window_ms() -> u64 { 1000 }

fn default_output_dir() -> String { ".".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self { enabled: default_demo_enabled() }
    }
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            probe_window_ms: default_probe_window_ms(),
            settle_window_ms: default_settle_window_ms(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { output_dir: default_output_dir() }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(crate::error::GroundlinkError::Config(
                toml::de::Error::custom("serial port cannot be empty")
            ));
        }

        if ![9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600]
            .contains(&self.serial.baud_rate)
        {
            return Err(crate::error::GroundlinkError::Config(
                toml::de::Error::custom(
                    "baud_rate must be one of: 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600",
                )
            ));
        }

        if self.negotiation.probe_window_ms == 0 || self.negotiation.probe_window_ms > 60000 {
            return Err(crate::error::GroundlinkError::Config(
                toml::de::Error::custom("probe_window_ms must be between 1 and 60000")
            ));
        }

        if self.negotiation.settle_window_ms == 0 || self.negotiation.settle_window_ms > 60000 {
            return Err(crate::error::GroundlinkError::Config(
                toml::de::Error::custom("settle_window_ms must be between 1 and 60000")
            ));
        }

        if self.export.output_dir.is_empty() {
            return Err(crate::error::GroundlinkError::Config(
                toml::de::Error::custom("export output_dir cannot be empty")
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, 115200);
        assert!(!config.demo.enabled);
        assert_eq!(config.negotiation.probe_window_ms, 2000);
        assert_eq!(config.negotiation.settle_window_ms, 1000);
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[serial]
port = "/dev/ttyUSB0"
baud_rate = 921600

[demo]
enabled = true

[negotiation]
settle_window_ms = 1500

[export]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 921600);
        assert!(config.demo.enabled);
        assert_eq!(config.negotiation.settle_window_ms, 1500);
        assert_eq!(config.negotiation.probe_window_ms, 2000);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.baud_rate, 115200);
    }

    #[test]
    fn test_empty_serial_port() {
        let mut config = Config::default();
        config.serial.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = Config::default();
        config.serial.baud_rate = 420_000; // Not a console rate
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_baud_rates() {
        for &baud in &[9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600] {
            let mut config = Config::default();
            config.serial.baud_rate = baud;
            assert!(config.validate().is_ok(), "Baud rate {} should be valid", baud);
        }
    }

    #[test]
    fn test_probe_window_zero() {
        let mut config = Config::default();
        config.negotiation.probe_window_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settle_window_too_high() {
        let mut config = Config::default();
        config.negotiation.settle_window_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_output_dir() {
        let mut config = Config::default();
        config.export.output_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_serial_port(), "/dev/ttyACM0");
        assert_eq!(default_baud_rate(), 115200);
        assert_eq!(default_demo_enabled(), false);
        assert_eq!(default_probe_window_ms(), 2000);
        assert_eq!(default_settle_window_ms(), 1000);
        assert_eq!(default_output_dir(), ".");
    }
}
