/*!
 * Error types for device operations.
 */
use thiserror::Error;

/// Error type for device operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The requested command id does not exist on the device
    #[error("Unknown command: {0}")]
    CommandNotFound(String),

    /// The transport could not be reached or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// The payload or a device reply could not be handled
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An operation did not complete in time
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// The device or transport configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] avlink_core::error::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;
