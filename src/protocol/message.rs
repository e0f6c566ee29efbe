//! Typed SW-P-08 messages.
//!
//! Maps verified [`Frame`]s to and from command semantics: crosspoint
//! connects, interrogates, tallies, and tally dumps. The frame data layout
//! for crosspoint commands is `matrixLevel | multiplier | destLow | srcLow`,
//! with `matrixLevel = (matrix << 4) | level`; interrogate omits `srcLow`.

use crate::error::{ProtocolError, Result};
use crate::types::CrosspointAddress;

use super::{CommandCode, Frame};

/// One decoded tally: an address plus the source-status bit carried in the
/// multiplier byte (set by TDM routers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TallyEntry {
    pub address: CrosspointAddress,
    pub source_status: bool,
}

/// Pack destination-high, source-status, and source-high into the
/// multiplier byte: bits 6-4 destination-high, bit 3 source-status,
/// bits 2-0 source-high.
pub fn pack_multiplier(destination: u16, source: u16, source_status: bool) -> u8 {
    let dest_high = ((destination >> 7) & 0x07) as u8;
    let src_high = ((source >> 7) & 0x07) as u8;
    (dest_high << 4) | (u8::from(source_status) << 3) | src_high
}

/// Unpack the multiplier byte into (destination-high, source-status,
/// source-high).
pub fn unpack_multiplier(multiplier: u8) -> (u8, bool, u8) {
    let dest_high = (multiplier >> 4) & 0x07;
    let source_status = multiplier & 0x08 != 0;
    let src_high = multiplier & 0x07;
    (dest_high, source_status, src_high)
}

fn matrix_level(matrix: u8, level: u8) -> u8 {
    (matrix << 4) | (level & 0x0F)
}

fn split_matrix_level(byte: u8) -> (u8, u8) {
    (byte >> 4, byte & 0x0F)
}

/// A typed SW-P-08 command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Route a source to a destination (to router).
    Connect(CrosspointAddress),
    /// Ask for the current source of a destination (to router).
    Interrogate { matrix: u8, level: u8, destination: u16 },
    /// Ask for a full tally dump of one (matrix, level) (to router).
    TallyDumpRequest { matrix: u8, level: u8 },
    /// Unsolicited tally (from router).
    Tally(TallyEntry),
    /// Connect confirmation, tally layout (from router).
    Connected(TallyEntry),
    /// Byte-form dump: one source-low byte per destination from 0
    /// (from router).
    TallyDumpByte {
        matrix: u8,
        level: u8,
        entries: Vec<TallyEntry>,
    },
    /// Word-form dump: (multiplier, source-low) pairs per destination from 0
    /// (from router).
    TallyDumpWord {
        matrix: u8,
        level: u8,
        entries: Vec<TallyEntry>,
    },
    /// Group salvo staging acknowledgement (from router).
    ConnectOnGoAck(Vec<u8>),
    /// Group salvo go/done acknowledgement (from router).
    GoDoneAck(Vec<u8>),
    /// Group salvo staged-contents tally (from router).
    GroupSalvoTally(Vec<u8>),
}

impl Message {
    pub fn command(&self) -> CommandCode {
        match self {
            Self::Connect(_) => CommandCode::CrosspointConnect,
            Self::Interrogate { .. } => CommandCode::CrosspointInterrogate,
            Self::TallyDumpRequest { .. } => CommandCode::TallyDumpRequest,
            Self::Tally(_) => CommandCode::CrosspointTally,
            Self::Connected(_) => CommandCode::CrosspointConnected,
            Self::TallyDumpByte { .. } => CommandCode::TallyDumpByte,
            Self::TallyDumpWord { .. } => CommandCode::TallyDumpWord,
            Self::ConnectOnGoAck(_) => CommandCode::ConnectOnGoAck,
            Self::GoDoneAck(_) => CommandCode::GoDoneAck,
            Self::GroupSalvoTally(_) => CommandCode::GroupSalvoTally,
        }
    }

    /// Encode to a frame. Dump replies encode too, which the tests use to
    /// play the router side of the link.
    pub fn to_frame(&self) -> Frame {
        let (cmd, data) = match self {
            Self::Connect(addr) => (
                CommandCode::CrosspointConnect,
                vec![
                    matrix_level(addr.matrix, addr.level),
                    pack_multiplier(addr.destination, addr.source, false),
                    (addr.destination & 0x7F) as u8,
                    (addr.source & 0x7F) as u8,
                ],
            ),
            Self::Interrogate {
                matrix,
                level,
                destination,
            } => (
                CommandCode::CrosspointInterrogate,
                vec![
                    matrix_level(*matrix, *level),
                    pack_multiplier(*destination, 0, false),
                    (*destination & 0x7F) as u8,
                ],
            ),
            Self::TallyDumpRequest { matrix, level } => (
                CommandCode::TallyDumpRequest,
                vec![matrix_level(*matrix, *level)],
            ),
            Self::Tally(entry) | Self::Connected(entry) => {
                let addr = entry.address;
                (
                    self.command(),
                    vec![
                        matrix_level(addr.matrix, addr.level),
                        pack_multiplier(addr.destination, addr.source, entry.source_status),
                        (addr.destination & 0x7F) as u8,
                        (addr.source & 0x7F) as u8,
                    ],
                )
            }
            Self::TallyDumpByte {
                matrix,
                level,
                entries,
            } => {
                let mut data = vec![matrix_level(*matrix, *level)];
                data.extend(entries.iter().map(|e| (e.address.source & 0x7F) as u8));
                (CommandCode::TallyDumpByte, data)
            }
            Self::TallyDumpWord {
                matrix,
                level,
                entries,
            } => {
                let mut data = vec![matrix_level(*matrix, *level)];
                for e in entries {
                    data.push(pack_multiplier(
                        e.address.destination,
                        e.address.source,
                        e.source_status,
                    ));
                    data.push((e.address.source & 0x7F) as u8);
                }
                (CommandCode::TallyDumpWord, data)
            }
            Self::ConnectOnGoAck(data) => (CommandCode::ConnectOnGoAck, data.clone()),
            Self::GoDoneAck(data) => (CommandCode::GoDoneAck, data.clone()),
            Self::GroupSalvoTally(data) => (CommandCode::GroupSalvoTally, data.clone()),
        };
        Frame::new(cmd as u8, data)
    }

    /// Decode a verified frame into a typed message.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let code = CommandCode::from_u8(frame.cmd)
            .ok_or(ProtocolError::UnknownCommand(frame.cmd))?;
        let data = &frame.data;

        match code {
            CommandCode::CrosspointConnect => {
                let entry = parse_crosspoint(data, "connect")?;
                Ok(Self::Connect(entry.address))
            }
            CommandCode::CrosspointInterrogate => {
                need(data, 3, "interrogate")?;
                let (matrix, level) = split_matrix_level(data[0]);
                let (dest_high, _, _) = unpack_multiplier(data[1]);
                let destination = u16::from(dest_high) * 128 + u16::from(data[2] & 0x7F);
                Ok(Self::Interrogate {
                    matrix,
                    level,
                    destination,
                })
            }
            CommandCode::TallyDumpRequest => {
                need(data, 1, "tally dump request")?;
                let (matrix, level) = split_matrix_level(data[0]);
                Ok(Self::TallyDumpRequest { matrix, level })
            }
            CommandCode::CrosspointTally => {
                Ok(Self::Tally(parse_crosspoint(data, "tally")?))
            }
            CommandCode::CrosspointConnected => {
                Ok(Self::Connected(parse_crosspoint(data, "connected")?))
            }
            CommandCode::TallyDumpByte => {
                need(data, 1, "tally dump")?;
                let (matrix, level) = split_matrix_level(data[0]);
                let entries = data[1..]
                    .iter()
                    .enumerate()
                    .map(|(i, &src)| TallyEntry {
                        address: CrosspointAddress::new(
                            matrix,
                            level,
                            i as u16,
                            u16::from(src & 0x7F),
                        ),
                        source_status: false,
                    })
                    .collect();
                Ok(Self::TallyDumpByte {
                    matrix,
                    level,
                    entries,
                })
            }
            CommandCode::TallyDumpWord => {
                need(data, 1, "tally dump")?;
                let (matrix, level) = split_matrix_level(data[0]);
                let words = &data[1..];
                if words.len() % 2 != 0 {
                    return Err(ProtocolError::TruncatedData {
                        command: "tally dump word",
                        expected: words.len() + 1,
                        got: words.len(),
                    }
                    .into());
                }
                let entries = words
                    .chunks_exact(2)
                    .enumerate()
                    .map(|(i, pair)| {
                        let (_, source_status, src_high) = unpack_multiplier(pair[0]);
                        TallyEntry {
                            address: CrosspointAddress::new(
                                matrix,
                                level,
                                i as u16,
                                u16::from(src_high) * 128 + u16::from(pair[1] & 0x7F),
                            ),
                            source_status,
                        }
                    })
                    .collect();
                Ok(Self::TallyDumpWord {
                    matrix,
                    level,
                    entries,
                })
            }
            CommandCode::ConnectOnGoAck => Ok(Self::ConnectOnGoAck(data.clone())),
            CommandCode::GoDoneAck => Ok(Self::GoDoneAck(data.clone())),
            CommandCode::GroupSalvoTally => Ok(Self::GroupSalvoTally(data.clone())),
            CommandCode::ConnectOnGoGroupSalvo
            | CommandCode::GoGroupSalvo
            | CommandCode::GroupSalvoInterrogate => {
                // To-router codes are never expected back; surface them the
                // same way as unknown commands.
                Err(ProtocolError::UnknownCommand(frame.cmd).into())
            }
        }
    }
}

fn need(data: &[u8], len: usize, command: &'static str) -> Result<()> {
    if data.len() < len {
        return Err(ProtocolError::TruncatedData {
            command,
            expected: len,
            got: data.len(),
        }
        .into());
    }
    Ok(())
}

fn parse_crosspoint(data: &[u8], command: &'static str) -> Result<TallyEntry> {
    need(data, 4, command)?;
    let (matrix, level) = split_matrix_level(data[0]);
    let (dest_high, source_status, src_high) = unpack_multiplier(data[1]);
    let destination = u16::from(dest_high) * 128 + u16::from(data[2] & 0x7F);
    let source = u16::from(src_high) * 128 + u16::from(data[3] & 0x7F);
    Ok(TallyEntry {
        address: CrosspointAddress::new(matrix, level, destination, source),
        source_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplier_packs_high_nibbles() {
        // dest=900 -> high 7, low 4; src=130 -> high 1, low 2
        let m = pack_multiplier(900, 130, true);
        assert_eq!(m, 0b0111_1001);
        assert_eq!(unpack_multiplier(m), (7, true, 1));
    }

    #[test]
    fn multiplier_zero_for_low_addresses() {
        assert_eq!(pack_multiplier(5, 10, false), 0x00);
    }

    #[test]
    fn connect_frame_layout() {
        let msg = Message::Connect(CrosspointAddress::new(2, 3, 200, 300));
        let frame = msg.to_frame();
        assert_eq!(frame.cmd, 0x02);
        // matrixLevel = 0x23; dest 200 = 1*128 + 72; src 300 = 2*128 + 44
        assert_eq!(frame.data, vec![0x23, 0b0001_0010, 72, 44]);
    }

    #[test]
    fn interrogate_omits_source_low() {
        let msg = Message::Interrogate {
            matrix: 0,
            level: 1,
            destination: 5,
        };
        let frame = msg.to_frame();
        assert_eq!(frame.cmd, 0x01);
        assert_eq!(frame.data, vec![0x01, 0x00, 0x05]);
    }

    #[test]
    fn tally_roundtrip() {
        let entry = TallyEntry {
            address: CrosspointAddress::new(1, 1, 5, 0),
            source_status: true,
        };
        let frame = Message::Tally(entry).to_frame();
        assert_eq!(frame.data, vec![0x11, 0x08, 0x05, 0x00]);

        match Message::from_frame(&frame).unwrap() {
            Message::Tally(decoded) => assert_eq!(decoded, entry),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn crosspoint_roundtrip_across_high_ranges() {
        for &(dest, src) in &[(0u16, 0u16), (127, 128), (128, 127), (1023, 1023), (513, 640)] {
            let entry = TallyEntry {
                address: CrosspointAddress::new(3, 7, dest, src),
                source_status: dest % 2 == 0,
            };
            let decoded = Message::from_frame(&Message::Tally(entry).to_frame()).unwrap();
            assert_eq!(decoded, Message::Tally(entry));
        }
    }

    #[test]
    fn dump_byte_entries_start_at_destination_zero() {
        let frame = Frame::new(0x16, vec![0x21, 7, 9, 11]);
        match Message::from_frame(&frame).unwrap() {
            Message::TallyDumpByte {
                matrix,
                level,
                entries,
            } => {
                assert_eq!((matrix, level), (2, 1));
                assert_eq!(entries.len(), 3);
                assert_eq!(entries[0].address.destination, 0);
                assert_eq!(entries[0].address.source, 7);
                assert_eq!(entries[2].address.destination, 2);
                assert_eq!(entries[2].address.source, 11);
                assert!(!entries[1].source_status);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn dump_word_carries_source_high_and_status() {
        // Two destinations: d0 <- s200 (status), d1 <- s3
        let frame = Frame::new(
            0x17,
            vec![0x00, pack_multiplier(0, 200, true), 72, pack_multiplier(1, 3, false), 3],
        );
        match Message::from_frame(&frame).unwrap() {
            Message::TallyDumpWord { entries, .. } => {
                assert_eq!(entries[0].address.source, 200);
                assert!(entries[0].source_status);
                assert_eq!(entries[1].address.destination, 1);
                assert_eq!(entries[1].address.source, 3);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn dump_word_rejects_odd_payload() {
        let frame = Frame::new(0x17, vec![0x00, 0x00]);
        assert!(Message::from_frame(&frame).is_err());
    }

    #[test]
    fn truncated_tally_is_rejected() {
        let frame = Frame::new(0x03, vec![0x11, 0x08, 0x05]);
        assert!(Message::from_frame(&frame).is_err());
    }

    #[test]
    fn unknown_command_is_rejected() {
        let frame = Frame::new(0x42, vec![]);
        assert!(Message::from_frame(&frame).is_err());
    }
}
