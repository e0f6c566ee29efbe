//! Serial transport.
//!
//! Opens the tty with the SW-P-08 line discipline: 8 data bits, 1 stop bit,
//! even parity, no flow control. Only the device path and baud rate are
//! configurable; 38 400 baud is the conventional default.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info};

use super::{SerialConfig, Transport};
use crate::error::{Result, TransportError};

/// RS-232/RS-422 transport to the router's control port.
#[derive(Debug)]
pub struct SerialTransport {
    stream: Option<SerialStream>,
    endpoint: String,
}

impl SerialTransport {
    /// Open the configured device.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        debug!(path = %config.path, baud = config.baud, "opening serial port");

        let stream = tokio_serial::new(&config.path, config.baud)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::Even)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| open_error(&config.path, &e))?;

        info!(path = %config.path, baud = config.baud, "serial port open");

        Ok(Self {
            stream: Some(stream),
            endpoint: format!("{}@{}", config.path, config.baud),
        })
    }
}

fn open_error(path: &str, e: &tokio_serial::Error) -> TransportError {
    match e.kind {
        tokio_serial::ErrorKind::NoDevice => TransportError::NotFound {
            endpoint: path.to_string(),
        },
        tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            TransportError::PermissionDenied {
                endpoint: path.to_string(),
            }
        }
        tokio_serial::ErrorKind::Io(std::io::ErrorKind::NotFound) => TransportError::NotFound {
            endpoint: path.to_string(),
        },
        _ => TransportError::Serial(e.to_string()),
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(TransportError::Closed)?;

        stream
            .write_all(data)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        stream
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        Ok(data.len())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(TransportError::Closed)?;

        let n = stream
            .read(buf)
            .await
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;

        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the stream releases the tty.
        self.stream.take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn transport_type(&self) -> &'static str {
        "serial"
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}
