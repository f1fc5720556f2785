/*!
 * Byte transports.
 *
 * One trait, four implementations: TCP, UDP, direct serial, and serial
 * bridged through a companion board's HTTP API. The coordinator selects
 * the implementation once at construction and stays transport-agnostic
 * afterwards.
 */
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::descriptor::{TransportConfig, TransportKind};
use crate::error::Result;

mod bridge;
mod serial;
mod tcp;
mod udp;

pub use bridge::BridgeTransport;
pub use serial::SerialTransport;
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

/// Buffered inbound chunks per push transport
pub(crate) const INBOUND_CHANNEL_CAPACITY: usize = 32;

/// Read buffer size for stream transports
pub(crate) const READ_BUFFER_SIZE: usize = 4096;

/// How a transport delivers inbound data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Inbound bytes are pushed on a background stream
    Push,
    /// Replies arrive inline with each send; there is no listen loop
    RequestReply,
}

/// A byte-level connection to one device
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// The transport kind
    fn kind(&self) -> TransportKind;

    /// How inbound data is delivered
    fn delivery(&self) -> Delivery {
        Delivery::Push
    }

    /// Establish the connection
    ///
    /// Push transports return a receiver of inbound byte chunks; the
    /// internal read task drops its sender on EOF or read error, which
    /// closes the channel. Request/reply transports return `None`.
    async fn connect(&self) -> Result<Option<mpsc::Receiver<Bytes>>>;

    /// Close the connection and stop any read task
    async fn disconnect(&self);

    /// Transmit a payload
    ///
    /// Push transports return `Ok(None)`; the bridge performs a
    /// round trip and returns any inline reply bytes. `reply_window` is
    /// how long the remote end may take to answer when the caller wants
    /// a reply; push transports ignore it.
    async fn send(&self, payload: &[u8], reply_window: Option<Duration>) -> Result<Option<Bytes>>;
}

/// Build the transport for a configuration
pub fn build(config: &TransportConfig) -> Box<dyn Transport> {
    match config {
        TransportConfig::Tcp(c) => Box::new(TcpTransport::new(c.clone())),
        TransportConfig::Udp(c) => Box::new(UdpTransport::new(c.clone())),
        TransportConfig::SerialDirect(c) => Box::new(SerialTransport::new(c.clone())),
        TransportConfig::SerialBridge(c) => Box::new(BridgeTransport::new(c.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{BridgeConfig, NetworkConfig};

    #[test]
    fn test_build_selects_by_kind() {
        let tcp = build(&TransportConfig::Tcp(NetworkConfig {
            host: "localhost".to_string(),
            port: 9000,
            timeout_secs: 1.0,
            persistent_connection: true,
            reconnect_interval_secs: 5.0,
        }));
        assert_eq!(tcp.kind(), TransportKind::Tcp);
        assert_eq!(tcp.delivery(), Delivery::Push);

        let bridge = build(&TransportConfig::SerialBridge(BridgeConfig {
            board_id: "board-1".into(),
            base_url: "http://10.0.0.40".to_string(),
            uart: 1,
            baud_rate: 9600,
            rx_pin: 9,
            tx_pin: 10,
            timeout_secs: 5.0,
            reconnect_interval_secs: 30.0,
        }));
        assert_eq!(bridge.kind(), TransportKind::SerialBridge);
        assert_eq!(bridge.delivery(), Delivery::RequestReply);
    }
}
