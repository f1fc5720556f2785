/*!
 * Logging functionality for AVLink.
 *
 * This module provides tracing setup and utilities for consistent logging
 * across the AVLink ecosystem.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};

/// Initialize the logging system with default configuration
pub fn init() -> Result<()> {
    init_with_filter("info")
}

/// Initialize the logging system with a specific filter
///
/// # Arguments
///
/// * `filter` - The log filter string (e.g., "info", "debug", "avlink=trace")
pub fn init_with_filter(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// A type alias for a tracing span
pub type Span = tracing::Span;

/// Create a new span for a device
///
/// # Arguments
///
/// * `name` - The device name
/// * `id` - An optional device id
pub fn device_span(name: &str, id: Option<&str>) -> Span {
    match id {
        Some(id) => tracing::info_span!("device", name = %name, id = %id),
        None => tracing::info_span!("device", name = %name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        // Fails when a subscriber is already installed, which is fine here
        let _ = init();
    }

    #[test]
    fn test_device_span() {
        let span = device_span("matrix", Some("matrix-1"));
        assert!(span.is_none()); // Not entered yet

        let span = device_span("matrix", None);
        assert!(span.is_none());
    }
}
