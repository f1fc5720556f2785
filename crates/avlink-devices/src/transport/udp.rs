/*!
 * UDP transport.
 *
 * Uses a connected datagram socket so `send`/`recv` talk to one device.
 * UDP "connect" cannot verify the remote end; the socket is considered
 * connected once it is bound and associated with the peer address.
 */
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::descriptor::{NetworkConfig, TransportKind};
use crate::error::{DeviceError, Result};
use crate::transport::{Transport, INBOUND_CHANNEL_CAPACITY, READ_BUFFER_SIZE};

/// UDP datagram transport
#[derive(Debug)]
pub struct UdpTransport {
    config: NetworkConfig,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl UdpTransport {
    /// Create a transport for the given network configuration
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            socket: Mutex::new(None),
            recv_task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    async fn connect(&self) -> Result<Option<mpsc::Receiver<Bytes>>> {
        info!("Setting up UDP for {}:{}", self.config.host, self.config.port);

        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(|err| {
            DeviceError::Connection(format!("Failed to bind UDP socket: {}", err))
        })?;
        socket
            .connect((self.config.host.clone(), self.config.port))
            .await
            .map_err(|err| {
                DeviceError::Connection(format!(
                    "Failed to setup UDP for {}:{}: {}",
                    self.config.host, self.config.port, err
                ))
            })?;

        let socket = Arc::new(socket);
        *self.socket.lock().await = Some(Arc::clone(&socket));

        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let peer = format!("{}:{}", self.config.host, self.config.port);
        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            loop {
                match socket.recv(&mut buf).await {
                    Ok(n) => {
                        if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                            debug!("UDP receiver for {} dropped", peer);
                            break;
                        }
                    }
                    Err(err) => {
                        warn!("UDP error from {}: {}", peer, err);
                        break;
                    }
                }
            }
        });
        if let Some(old) = self.recv_task.lock().await.replace(handle) {
            old.abort();
        }

        info!("UDP ready for {}:{}", self.config.host, self.config.port);
        Ok(Some(rx))
    }

    async fn disconnect(&self) {
        if let Some(task) = self.recv_task.lock().await.take() {
            task.abort();
        }
        self.socket.lock().await.take();
    }

    async fn send(&self, payload: &[u8], _reply_window: Option<Duration>) -> Result<Option<Bytes>> {
        let guard = self.socket.lock().await;
        let socket = guard
            .as_ref()
            .ok_or_else(|| DeviceError::Connection("UDP transport not established".to_string()))?;

        socket.send(payload).await.map_err(|err| {
            DeviceError::Connection(format!(
                "UDP send to {}:{} failed: {}",
                self.config.host, self.config.port, err
            ))
        })?;

        Ok(None)
    }
}
