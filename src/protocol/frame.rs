//! Frame structure and the stateless encoder.

use crate::error::{ProtocolError, Result};

use super::{DLE, ETX, STX};

/// Maximum data length per frame. The byte count field is a single byte and
/// covers `len(data) + 2`, so data is capped at 253 bytes.
pub const MAX_DATA_LEN: usize = 253;

/// One SW-P-08 frame: a command byte plus its data bytes.
///
/// The byte count and checksum are computed on encode and verified on
/// decode; they are never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command code. Kept as a raw byte so unknown commands survive the
    /// frame layer; interpretation happens in [`super::Message`].
    pub cmd: u8,
    /// Unescaped data bytes.
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(cmd: u8, data: Vec<u8>) -> Self {
        Self { cmd, data }
    }

    /// Encode to wire bytes: checksum and byte count appended, DLE
    /// transparency applied, DLE-STX / DLE-ETX wrapped.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.data.len() > MAX_DATA_LEN {
            return Err(ProtocolError::DataTooLarge(self.data.len()).into());
        }

        let byte_count = (self.data.len() + 2) as u8;

        // cmd | data | bytecount | checksum, before escaping
        let mut body = Vec::with_capacity(self.data.len() + 3);
        body.push(self.cmd);
        body.extend_from_slice(&self.data);
        body.push(byte_count);
        body.push(checksum(&body));

        // Worst case every byte is a DLE
        let mut wire = Vec::with_capacity(body.len() * 2 + 4);
        wire.push(DLE);
        wire.push(STX);
        for &b in &body {
            wire.push(b);
            if b == DLE {
                wire.push(DLE);
            }
        }
        wire.push(DLE);
        wire.push(ETX);

        Ok(wire)
    }
}

/// SW-P-08 checksum: 7-bit two's complement of the modulo-256 sum of
/// `cmd | data | bytecount`. The MSB of the result is forced to zero.
pub fn checksum(body: &[u8]) -> u8 {
    let sum = body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    (!sum).wrapping_add(1) & 0x7F
}
