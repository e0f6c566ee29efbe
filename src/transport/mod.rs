//! Byte transports to the router.
//!
//! A transport is a plain bidirectional byte stream with no framing
//! knowledge. Two variants exist: a TCP socket and an RS-232/RS-422 serial
//! port with a fixed line discipline (8 data bits, 1 stop bit, even parity).
//! The router end is an exclusive resource: exactly one transport is open at
//! a time, owned by the link task.

mod serial;
mod tcp;

pub use serial::SerialTransport;
pub use tcp::TcpTransport;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// TCP socket to a router frame or terminal server.
    #[default]
    Tcp,
    /// Direct serial line.
    Serial,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Serial => write!(f, "serial"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "serial" => Ok(Self::Serial),
            other => Err(format!("unknown transport '{other}' (expected tcp or serial)")),
        }
    }
}

/// TCP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Router hostname or address.
    #[serde(default = "default_tcp_host")]
    pub host: String,

    /// Router control port.
    #[serde(default = "default_tcp_port")]
    pub port: u16,

    /// Connection timeout.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

fn default_tcp_host() -> String {
    "localhost".into()
}
fn default_tcp_port() -> u16 {
    2000
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: default_tcp_host(),
            port: default_tcp_port(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Serial endpoint configuration. The line discipline (8/1, even parity, no
/// flow control) is fixed by the protocol; only the device and baud rate are
/// configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial device path.
    #[serde(default = "default_serial_path")]
    pub path: String,

    /// Baud rate.
    #[serde(default = "default_baud")]
    pub baud: u32,
}

fn default_serial_path() -> String {
    "/dev/ttyUSB0".into()
}
fn default_baud() -> u32 {
    38_400
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: default_serial_path(),
            baud: default_baud(),
        }
    }
}

/// A bidirectional byte stream to the router.
///
/// Writes are atomic at the chunk boundary passed in; reads return whatever
/// is available. `recv` returning `Ok(0)` signals an orderly close.
#[async_trait]
pub trait Transport: Send {
    /// Write one chunk of bytes.
    async fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Read whatever is available into `buf`. `Ok(0)` means the peer closed.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Close the transport. Idempotent.
    async fn close(&mut self) -> Result<()>;

    /// Whether the stream is still open.
    fn is_connected(&self) -> bool;

    /// Transport type name for logs and status reports.
    fn transport_type(&self) -> &'static str;

    /// Human-readable endpoint description.
    fn endpoint(&self) -> String;
}

/// Open a transport of the configured kind.
pub async fn connect(
    kind: TransportKind,
    tcp: &TcpConfig,
    serial: &SerialConfig,
) -> Result<Box<dyn Transport>> {
    match kind {
        TransportKind::Tcp => {
            let transport = TcpTransport::connect(tcp).await?;
            Ok(Box::new(transport))
        }
        TransportKind::Serial => {
            let transport = SerialTransport::open(serial)?;
            Ok(Box::new(transport))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_from_config_strings() {
        let kind: TransportKind = serde_json::from_str("\"tcp\"").unwrap();
        assert_eq!(kind, TransportKind::Tcp);
        let kind: TransportKind = serde_json::from_str("\"serial\"").unwrap();
        assert_eq!(kind, TransportKind::Serial);
    }

    #[test]
    fn defaults_match_protocol_conventions() {
        let tcp = TcpConfig::default();
        assert_eq!(tcp.port, 2000);
        let serial = SerialConfig::default();
        assert_eq!(serial.baud, 38_400);
    }
}
