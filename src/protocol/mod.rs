//! SW-P-08 wire protocol: framing, checksums, and typed messages.
//!
//! Everything in this module is bit-exact to the SW-P-08 (Pro-Bel) serial
//! control protocol. The frame layer (`frame`, `codec`) knows nothing about
//! command semantics; the `message` layer maps frames to typed commands.

mod codec;
mod frame;
mod message;

pub use codec::{DecoderEvent, FrameDecoder};
pub use frame::{checksum, Frame, MAX_DATA_LEN};
pub use message::{pack_multiplier, unpack_multiplier, Message, TallyEntry};

/// Data Link Escape: frame delimiter prefix and transparency escape.
pub const DLE: u8 = 0x10;
/// Start of text: `DLE STX` opens a frame.
pub const STX: u8 = 0x02;
/// End of text: `DLE ETX` closes a frame.
pub const ETX: u8 = 0x03;
/// Positive acknowledge: `DLE ACK` is a complete link-level event.
pub const ACK: u8 = 0x06;
/// Negative acknowledge: `DLE NAK` is a complete link-level event.
pub const NAK: u8 = 0x15;

/// SW-P-08 command codes. The values are fixed by the protocol and must not
/// be changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandCode {
    /// Ask the router for the current source of one destination.
    CrosspointInterrogate = 0x01,
    /// Route one source to one destination.
    CrosspointConnect = 0x02,
    /// Unsolicited report of a destination's current source.
    CrosspointTally = 0x03,
    /// Confirmation of a connect, same layout as a tally.
    CrosspointConnected = 0x04,
    /// Ask for a full tally dump of one (matrix, level).
    TallyDumpRequest = 0x15,
    /// Dump reply, one source byte per destination.
    TallyDumpByte = 0x16,
    /// Dump reply, one (multiplier, source) word per destination.
    TallyDumpWord = 0x17,
    /// Stage a crosspoint into a group salvo.
    ConnectOnGoGroupSalvo = 0x78,
    /// Fire a staged group salvo.
    GoGroupSalvo = 0x79,
    /// Router acknowledgement of a staged crosspoint.
    ConnectOnGoAck = 0x7A,
    /// Router acknowledgement of a salvo go/done.
    GoDoneAck = 0x7B,
    /// Interrogate a group salvo's staged contents.
    GroupSalvoInterrogate = 0x7C,
    /// Tally of a group salvo's staged contents.
    GroupSalvoTally = 0x7D,
}

impl CommandCode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::CrosspointInterrogate),
            0x02 => Some(Self::CrosspointConnect),
            0x03 => Some(Self::CrosspointTally),
            0x04 => Some(Self::CrosspointConnected),
            0x15 => Some(Self::TallyDumpRequest),
            0x16 => Some(Self::TallyDumpByte),
            0x17 => Some(Self::TallyDumpWord),
            0x78 => Some(Self::ConnectOnGoGroupSalvo),
            0x79 => Some(Self::GoGroupSalvo),
            0x7A => Some(Self::ConnectOnGoAck),
            0x7B => Some(Self::GoDoneAck),
            0x7C => Some(Self::GroupSalvoInterrogate),
            0x7D => Some(Self::GroupSalvoTally),
            _ => None,
        }
    }

    /// Commands this process sends to the router.
    pub fn is_to_router(self) -> bool {
        matches!(
            self,
            Self::CrosspointInterrogate
                | Self::CrosspointConnect
                | Self::TallyDumpRequest
                | Self::ConnectOnGoGroupSalvo
                | Self::GoGroupSalvo
                | Self::GroupSalvoInterrogate
        )
    }
}

impl std::fmt::Display for CommandCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CrosspointInterrogate => "crosspoint-interrogate",
            Self::CrosspointConnect => "crosspoint-connect",
            Self::CrosspointTally => "crosspoint-tally",
            Self::CrosspointConnected => "crosspoint-connected",
            Self::TallyDumpRequest => "tally-dump-request",
            Self::TallyDumpByte => "tally-dump-byte",
            Self::TallyDumpWord => "tally-dump-word",
            Self::ConnectOnGoGroupSalvo => "connect-on-go-group-salvo",
            Self::GoGroupSalvo => "go-group-salvo",
            Self::ConnectOnGoAck => "connect-on-go-ack",
            Self::GoDoneAck => "go-done-ack",
            Self::GroupSalvoInterrogate => "group-salvo-interrogate",
            Self::GroupSalvoTally => "group-salvo-tally",
        };
        write!(f, "{name}")
    }
}
