//! Error types for Crossbar.

use std::io;

use thiserror::Error;

/// Result type alias for Crossbar operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Crossbar.
#[derive(Error, Debug)]
pub enum Error {
    // Transport errors
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    // Wire protocol errors
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // Link-level errors
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    // Session API errors
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("salvo {0} not found")]
    SalvoNotFound(u32),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // General errors
    #[error("internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Transport layer errors.
///
/// Fatal to the link: any of these tears the connection down and hands
/// control back to the reconnect supervisor.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("endpoint unreachable: {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },

    #[error("permission denied opening {endpoint}")]
    PermissionDenied { endpoint: String },

    #[error("endpoint not found: {endpoint}")]
    NotFound { endpoint: String },

    #[error("connect timeout to {endpoint}")]
    ConnectTimeout { endpoint: String },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("connection closed")]
    Closed,

    #[error("serial error: {0}")]
    Serial(String),
}

/// Framing and message parsing errors.
///
/// Recovered locally by the decoder (discard and resynchronise); these never
/// fail a client request directly.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid DLE escape: 0x10 followed by {0:#04x}")]
    InvalidEscape(u8),

    #[error("byte count mismatch: header says {expected}, body has {got}")]
    ByteCountMismatch { expected: usize, got: usize },

    #[error("checksum mismatch: expected {expected:#04x}, got {got:#04x}")]
    ChecksumMismatch { expected: u8, got: u8 },

    #[error("frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("unknown command code: {0:#04x}")]
    UnknownCommand(u8),

    #[error("truncated {command} data: expected {expected} bytes, got {got}")]
    TruncatedData {
        command: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("frame data too large: {0} bytes")]
    DataTooLarge(usize),
}

/// Link-layer command failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Max retries exceeded on an in-flight command.
    #[error("command timed out after retries exhausted")]
    Timeout,

    /// Transport dropped while the command was pending.
    #[error("link disconnected")]
    Disconnected,
}

/// Out-of-range arguments at the session API, rejected before any wire
/// traffic.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("matrix {value} out of range (max {max})")]
    Matrix { value: u8, max: u8 },

    #[error("level {value} out of range (max {max})")]
    Level { value: u8, max: u8 },

    #[error("destination {value} out of range (max {max})")]
    Destination { value: u16, max: u16 },

    #[error("source {value} out of range (max {max})")]
    Source { value: u16, max: u16 },
}

impl Error {
    /// Check if this error should tear down the router link.
    pub fn is_fatal_to_link(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Io(_))
    }

    /// Check if this error is recovered locally without failing any request.
    pub fn is_recovered_locally(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_fatal() {
        let err = Error::Transport(TransportError::Closed);
        assert!(err.is_fatal_to_link());
        assert!(!err.is_recovered_locally());
    }

    #[test]
    fn framing_errors_are_local() {
        let err = Error::Protocol(ProtocolError::ChecksumMismatch {
            expected: 0x43,
            got: 0x42,
        });
        assert!(err.is_recovered_locally());
        assert!(!err.is_fatal_to_link());
    }
}
