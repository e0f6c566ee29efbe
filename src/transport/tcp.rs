//! TCP client transport.
//!
//! Most SW-P-08 routers expose the control protocol on a raw TCP port
//! (directly or through a terminal server), conventionally port 2000.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use super::{TcpConfig, Transport};
use crate::error::{Result, TransportError};

/// TCP transport to the router's control port.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    endpoint: String,
}

impl TcpTransport {
    /// Connect to the configured endpoint.
    pub async fn connect(config: &TcpConfig) -> Result<Self> {
        let endpoint = format!("{}:{}", config.host, config.port);
        debug!(%endpoint, "connecting");

        let stream = timeout(config.connect_timeout, TcpStream::connect(&endpoint))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                endpoint: endpoint.clone(),
            })?
            .map_err(|e| open_error(&endpoint, &e))?;

        // Tallies are small and latency-sensitive
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::Unreachable {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        info!(%endpoint, "router connection established");

        Ok(Self {
            stream: Some(stream),
            endpoint,
        })
    }
}

fn open_error(endpoint: &str, e: &io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => TransportError::PermissionDenied {
            endpoint: endpoint.to_string(),
        },
        io::ErrorKind::NotFound => TransportError::NotFound {
            endpoint: endpoint.to_string(),
        },
        _ => TransportError::Unreachable {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        },
    }
}

#[async_trait]
impl Transport for TcpTransport {
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
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn transport_type(&self) -> &'static str {
        "tcp"
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}
