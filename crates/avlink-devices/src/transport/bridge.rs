/*!
 * Serial-over-HTTP bridge transport.
 *
 * Talks to a companion board that exposes one of its UARTs through a
 * small HTTP API. There is no persistent connection and no listen loop:
 * every exchange is a request/reply round trip, and any device reply
 * comes back inline in the HTTP response body.
 */
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::descriptor::{BridgeConfig, TransportKind};
use crate::error::{DeviceError, Result};
use crate::transport::{Delivery, Transport};

/// Extra headroom on top of the reply window for the HTTP round trip
const HTTP_OVERHEAD: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct SendReply {
    #[serde(default)]
    response: String,
}

/// Serial transport bridged through a companion board's HTTP API
#[derive(Debug)]
pub struct BridgeTransport {
    config: BridgeConfig,
    client: reqwest::Client,
}

impl BridgeTransport {
    /// Create a transport for the given bridge configuration
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::SerialBridge
    }

    fn delivery(&self) -> Delivery {
        Delivery::RequestReply
    }

    /// Configure the board's UART; no connection is held afterwards
    async fn connect(&self) -> Result<Option<mpsc::Receiver<Bytes>>> {
        info!(
            "Configuring UART {} on bridge {} at {} baud",
            self.config.uart, self.config.board_id, self.config.baud_rate
        );

        let response = self
            .client
            .post(self.url("serial/config"))
            .json(&json!({
                "uart": self.config.uart,
                "baud": self.config.baud_rate,
                "rx_pin": self.config.rx_pin,
                "tx_pin": self.config.tx_pin,
            }))
            .timeout(Duration::from_secs_f64(self.config.timeout_secs))
            .send()
            .await
            .map_err(|err| {
                DeviceError::Connection(format!(
                    "Failed to reach bridge {}: {}",
                    self.config.board_id, err
                ))
            })?;

        if !response.status().is_success() {
            return Err(DeviceError::Connection(format!(
                "Bridge {} rejected UART config: HTTP {}",
                self.config.board_id,
                response.status()
            )));
        }

        info!("Bridge {} UART {} ready", self.config.board_id, self.config.uart);
        Ok(None)
    }

    async fn disconnect(&self) {
        // Nothing to tear down; the bridge holds no session
        debug!("Releasing bridge {}", self.config.board_id);
    }

    async fn send(&self, payload: &[u8], reply_window: Option<Duration>) -> Result<Option<Bytes>> {
        let hex: String = payload.iter().map(|b| format!("{:02x}", b)).collect();
        let window = reply_window.unwrap_or(Duration::ZERO);

        let result = self
            .client
            .post(self.url("serial/send"))
            .json(&json!({
                "data": hex,
                "format": "hex",
                "timeout": window.as_millis() as u64,
            }))
            .timeout(window + HTTP_OVERHEAD)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                warn!("Bridge {} did not answer in time", self.config.board_id);
                return Ok(None);
            }
            Err(err) => {
                return Err(DeviceError::Connection(format!(
                    "Bridge {} send failed: {}",
                    self.config.board_id, err
                )));
            }
        };

        if !response.status().is_success() {
            return Err(DeviceError::Connection(format!(
                "Bridge {} send rejected: HTTP {}",
                self.config.board_id,
                response.status()
            )));
        }

        let reply: SendReply = response.json().await.map_err(|err| {
            DeviceError::Protocol(format!(
                "Malformed reply from bridge {}: {}",
                self.config.board_id, err
            ))
        })?;

        if reply.response.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Bytes::from(reply.response)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config_for(base_url: String) -> BridgeConfig {
        BridgeConfig {
            board_id: "board-1".into(),
            base_url,
            uart: 1,
            baud_rate: 9600,
            rx_pin: 9,
            tx_pin: 10,
            timeout_secs: 1.0,
            reconnect_interval_secs: 5.0,
        }
    }

    async fn serve_once(status_and_body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 2048];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(status_and_body.as_bytes()).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_connect_on_http_ok() {
        let base = serve_once("HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok").await;
        let transport = BridgeTransport::new(config_for(base));
        let channel = transport.connect().await.unwrap();
        assert!(channel.is_none());
    }

    #[tokio::test]
    async fn test_connect_rejected_is_connection_error() {
        let base = serve_once("HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\n\r\n").await;
        let transport = BridgeTransport::new(config_for(base));
        let result = transport.connect().await;
        assert!(matches!(result, Err(DeviceError::Connection(_))));
    }

    #[tokio::test]
    async fn test_send_returns_inline_reply() {
        let body = r#"{"response": "PWON"}"#;
        let base = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 20\r\n\r\n{\"response\": \"PWON\"}",
        )
        .await;
        assert_eq!(body.len(), 20);

        let transport = BridgeTransport::new(config_for(base));
        let reply = transport
            .send(b"PW?\r", Some(Duration::from_millis(500)))
            .await
            .unwrap();
        assert_eq!(reply, Some(Bytes::from("PWON")));
    }

    #[tokio::test]
    async fn test_send_empty_reply_is_none() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 16\r\n\r\n{\"response\": \"\"}",
        )
        .await;
        let transport = BridgeTransport::new(config_for(base));
        let reply = transport.send(b"MUTE\r", None).await.unwrap();
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn test_unreachable_bridge_is_connection_error() {
        let transport = BridgeTransport::new(config_for("http://127.0.0.1:1".to_string()));
        let result = transport.connect().await;
        assert!(matches!(result, Err(DeviceError::Connection(_))));
    }
}
