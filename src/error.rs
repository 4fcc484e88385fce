//! # Error Types
//!
//! Custom error types for Groundlink using `thiserror`.

use thiserror::Error;

/// Main error type for Groundlink
#[derive(Debug, Error)]
pub enum GroundlinkError {
    /// Serial port errors (open, read, write)
    #[error("Serial error: {0}")]
    Serial(String),

    /// No serial port could be opened from the candidate list
    #[error("No serial port found (tried: {0})")]
    SerialPortNotFound(String),

    /// Line channel errors (send or subscribe failure)
    #[error("Channel error: {0}")]
    Channel(String),

    /// Packet export errors
    #[error("Export error: {0}")]
    Export(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Groundlink
pub type Result<T> = std::result::Result<T, GroundlinkError>;
