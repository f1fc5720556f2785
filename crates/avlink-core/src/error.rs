/*!
 * Error types for AVLink Core.
 *
 * This module defines the shared error type used across the AVLink
 * foundation crates, with constructor helpers for the common kinds.
 */
use thiserror::Error;

/// Error type for core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Timeout error
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Event delivery error
    #[error("Event error: {0}")]
    Event(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a runtime error
    pub fn runtime<S: Into<String>>(msg: S) -> Self {
        Error::Runtime(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Error::Serialization(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create an event delivery error
    pub fn event<S: Into<String>>(msg: S) -> Self {
        Error::Event(msg.into())
    }

    /// Create an uncategorized error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert!(matches!(Error::runtime("x"), Error::Runtime(_)));
        assert!(matches!(Error::timeout("x"), Error::Timeout(_)));
        assert!(matches!(Error::config("x"), Error::Config(_)));
    }

    #[test]
    fn test_display() {
        let err = Error::timeout("no reply");
        assert_eq!(err.to_string(), "Timeout error: no reply");
    }
}
