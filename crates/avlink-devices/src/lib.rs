/*!
 * AVLink Devices
 *
 * This crate provides the device communication layer of AVLink: device
 * descriptors, the four byte transports (TCP, UDP, direct serial and
 * serial bridged through a companion board's HTTP API), the payload
 * codec, the response parser, and the per-device communication
 * coordinator that ties them together.
 */

#![warn(missing_docs)]

// Re-export core prelude
pub use avlink_core::prelude;

pub mod catalog;
pub mod codec;
pub mod coordinator;
pub mod descriptor;
pub mod error;
pub mod matrix;
pub mod parser;
pub mod registry;
pub mod state;
pub mod transport;

// Re-export the types most callers need
pub use coordinator::{DeviceCoordinator, StateSubscription, DEFAULT_REPLY_TIMEOUT};
pub use descriptor::{
    BridgeConfig, Command, CommandFormat, DeviceDescriptor, LineEnding, MatrixInput, MatrixOutput,
    NetworkConfig, ResponsePattern, SerialConfig, TransportConfig, TransportKind,
};
pub use error::{DeviceError, Result};
pub use state::DeviceState;

/// AVLink devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the device system
pub fn init() -> std::result::Result<(), avlink_core::error::Error> {
    tracing::info!("AVLink Devices {} initialized", VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
