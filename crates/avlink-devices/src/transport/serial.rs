/*!
 * Direct serial transport.
 *
 * Opens a local serial port with tokio-serial and reads inbound chunks
 * on a background task, the same shape as the TCP transport.
 */
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info, warn};

use crate::descriptor::{SerialConfig, TransportKind};
use crate::error::{DeviceError, Result};
use crate::transport::{Transport, INBOUND_CHANNEL_CAPACITY, READ_BUFFER_SIZE};

/// Local serial port transport
#[derive(Debug)]
pub struct SerialTransport {
    config: SerialConfig,
    writer: Mutex<Option<WriteHalf<SerialStream>>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
}

impl SerialTransport {
    /// Create a transport for the given serial configuration
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            writer: Mutex::new(None),
            read_task: Mutex::new(None),
        }
    }

    fn data_bits(&self) -> DataBits {
        match self.config.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        }
    }

    fn stop_bits(&self) -> StopBits {
        match self.config.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        }
    }

    fn parity(&self) -> Parity {
        match self.config.parity.to_ascii_uppercase().as_str() {
            "E" => Parity::Even,
            "O" => Parity::Odd,
            _ => Parity::None,
        }
    }

    fn flow_control(&self) -> FlowControl {
        match self.config.flow_control.to_ascii_lowercase().as_str() {
            "rtscts" => FlowControl::Hardware,
            "xonxoff" => FlowControl::Software,
            _ => FlowControl::None,
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::SerialDirect
    }

    async fn connect(&self) -> Result<Option<mpsc::Receiver<Bytes>>> {
        info!(
            "Opening serial port {} at {} baud",
            self.config.port, self.config.baud_rate
        );

        let stream = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .data_bits(self.data_bits())
            .stop_bits(self.stop_bits())
            .parity(self.parity())
            .flow_control(self.flow_control())
            .timeout(Duration::from_secs_f64(self.config.timeout_secs))
            .open_native_async()
            .map_err(|err| {
                DeviceError::Connection(format!(
                    "Failed to open serial port {}: {}",
                    self.config.port, err
                ))
            })?;

        let (mut reader, writer) = tokio::io::split(stream);
        *self.writer.lock().await = Some(writer);

        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let port = self.config.port.clone();
        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        warn!("Serial port {} closed", port);
                        break;
                    }
                    Ok(n) => {
                        if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                            debug!("Serial receiver for {} dropped", port);
                            break;
                        }
                    }
                    Err(err) => {
                        warn!("Error reading from {}: {}", port, err);
                        break;
                    }
                }
            }
        });
        if let Some(old) = self.read_task.lock().await.replace(handle) {
            old.abort();
        }

        info!("Opened serial port {}", self.config.port);
        Ok(Some(rx))
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
        let writer = guard.as_mut().ok_or_else(|| {
            DeviceError::Connection("Serial connection not established".to_string())
        })?;

        writer.write_all(payload).await.map_err(|err| {
            DeviceError::Connection(format!("Write to {} failed: {}", self.config.port, err))
        })?;
        writer.flush().await.map_err(|err| {
            DeviceError::Connection(format!("Flush to {} failed: {}", self.config.port, err))
        })?;

        Ok(None)
    }
}
