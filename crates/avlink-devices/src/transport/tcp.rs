/*!
 * TCP transport.
 */
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::descriptor::{NetworkConfig, TransportKind};
use crate::error::{DeviceError, Result};
use crate::transport::{Transport, INBOUND_CHANNEL_CAPACITY, READ_BUFFER_SIZE};

/// TCP socket transport
#[derive(Debug)]
pub struct TcpTransport {
    config: NetworkConfig,
    writer: Mutex<Option<OwnedWriteHalf>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    /// Create a transport for the given network configuration
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            writer: Mutex::new(None),
            read_task: Mutex::new(None),
        }
    }

    fn spawn_reader(&self, mut reader: OwnedReadHalf) -> (JoinHandle<()>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let peer = format!("{}:{}", self.config.host, self.config.port);

        let handle = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        warn!("Connection closed by {}", peer);
                        break;
                    }
                    Ok(n) => {
                        if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                            debug!("TCP receiver for {} dropped", peer);
                            break;
                        }
                    }
                    Err(err) => {
                        warn!("Error reading from {}: {}", peer, err);
                        break;
                    }
                }
            }
        });

        (handle, rx)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    async fn connect(&self) -> Result<Option<mpsc::Receiver<Bytes>>> {
        let addr = (self.config.host.clone(), self.config.port);
        info!("Connecting to {}:{} via TCP", self.config.host, self.config.port);

        let timeout = Duration::from_secs_f64(self.config.timeout_secs);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                DeviceError::Connection(format!(
                    "Timeout connecting to {}:{}",
                    self.config.host, self.config.port
                ))
            })?
            .map_err(|err| {
                DeviceError::Connection(format!(
                    "Failed to connect to {}:{}: {}",
                    self.config.host, self.config.port, err
                ))
            })?;

        let (reader, writer) = stream.into_split();
        *self.writer.lock().await = Some(writer);

        info!("Connected to {}:{}", self.config.host, self.config.port);

        if self.config.persistent_connection {
            let (handle, rx) = self.spawn_reader(reader);
            if let Some(old) = self.read_task.lock().await.replace(handle) {
                old.abort();
            }
            Ok(Some(rx))
        } else {
            // Fire-and-forget mode: no listen loop, replies are dropped
            Ok(None)
        }
    }

    async fn disconnect(&self) {
        if let Some(task) = self.read_task.lock().await.take() {
            task.abort();
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }

    async fn send(&self, payload: &[u8], _reply_window: Option<Duration>) -> Result<Option<Bytes>> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| DeviceError::Connection("TCP connection not established".to_string()))?;

        writer.write_all(payload).await.map_err(|err| {
            DeviceError::Connection(format!(
                "Write to {}:{} failed: {}",
                self.config.host, self.config.port, err
            ))
        })?;
        writer.flush().await.map_err(|err| {
            DeviceError::Connection(format!(
                "Flush to {}:{} failed: {}",
                self.config.host, self.config.port, err
            ))
        })?;

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config_for(port: u16) -> NetworkConfig {
        NetworkConfig {
            host: "127.0.0.1".to_string(),
            port,
            timeout_secs: 1.0,
            persistent_connection: true,
            reconnect_interval_secs: 1.0,
        }
    }

    #[tokio::test]
    async fn test_connect_send_and_receive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"PW?\r");
            socket.write_all(b"PWON\r").await.unwrap();
        });

        let transport = TcpTransport::new(config_for(port));
        let mut rx = transport.connect().await.unwrap().expect("push channel");

        transport.send(b"PW?\r", None).await.unwrap();
        let chunk = rx.recv().await.expect("inbound chunk");
        assert_eq!(&chunk[..], b"PWON\r");

        transport.disconnect().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_closes_when_remote_disconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let transport = TcpTransport::new(config_for(port));
        let mut rx = transport.connect().await.unwrap().expect("push channel");

        server.await.unwrap();
        assert!(rx.recv().await.is_none());
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        // Port 1 is almost certainly closed
        let transport = TcpTransport::new(config_for(1));
        let result = transport.connect().await;
        assert!(matches!(result, Err(DeviceError::Connection(_))));
    }

    #[tokio::test]
    async fn test_send_without_connect_fails() {
        let transport = TcpTransport::new(config_for(9));
        let result = transport.send(b"x", None).await;
        assert!(matches!(result, Err(DeviceError::Connection(_))));
    }
}
