//! Stateful SW-P-08 frame decoder.
//!
//! The decoder accumulates bytes across reads and emits complete frames plus
//! the `DLE ACK` / `DLE NAK` short events. Framing violations (bad escape,
//! byte-count mismatch, checksum mismatch) are recovered locally: the
//! partial frame is discarded and the scanner resynchronises on the next
//! `DLE STX`. They are logged and counted, never surfaced to callers.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::{debug, trace, warn};

use crate::error::{Error, ProtocolError};

use super::{Frame, ACK, DLE, ETX, NAK, STX};

/// One event yielded by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderEvent {
    /// A complete, verified data frame.
    Frame(Frame),
    /// Link-level positive acknowledge (`DLE ACK`).
    Ack,
    /// Link-level negative acknowledge (`DLE NAK`).
    Nak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Outside a frame, hunting for DLE.
    Hunt,
    /// Outside a frame, previous byte was DLE.
    HuntDle,
    /// Inside a frame body.
    Body,
    /// Inside a frame body, previous byte was DLE.
    BodyDle,
}

/// Stateful decoder; owns one accumulating byte buffer.
#[derive(Debug)]
pub struct FrameDecoder {
    state: State,
    body: Vec<u8>,
    buffer: BytesMut,
    discarded_bytes: u64,
    framing_errors: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Hunt,
            body: Vec::new(),
            buffer: BytesMut::new(),
            discarded_bytes: 0,
            framing_errors: 0,
        }
    }

    /// Bytes dropped while hunting for a frame start.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded_bytes
    }

    /// Frames discarded for escape, byte-count, or checksum violations.
    pub fn framing_errors(&self) -> u64 {
        self.framing_errors
    }

    /// Feed a chunk of received bytes and drain every event it completes.
    ///
    /// Partial input is retained: output is identical whether the wire bytes
    /// arrive one per call or all at once.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DecoderEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        let mut buffer = std::mem::take(&mut self.buffer);
        while let Some(event) = self.advance(&mut buffer) {
            events.push(event);
        }
        self.buffer = buffer;
        events
    }

    /// Consume bytes from `src` until one event completes or input runs dry.
    fn advance(&mut self, src: &mut BytesMut) -> Option<DecoderEvent> {
        while !src.is_empty() {
            let byte = src[0];
            let _ = src.split_to(1);

            match self.state {
                State::Hunt => {
                    if byte == DLE {
                        self.state = State::HuntDle;
                    } else {
                        self.discarded_bytes += 1;
                        trace!(byte = format_args!("{byte:#04x}"), "discarding stray byte");
                    }
                }
                State::HuntDle => match byte {
                    STX => {
                        self.body.clear();
                        self.state = State::Body;
                    }
                    ACK => {
                        self.state = State::Hunt;
                        return Some(DecoderEvent::Ack);
                    }
                    NAK => {
                        self.state = State::Hunt;
                        return Some(DecoderEvent::Nak);
                    }
                    DLE => {
                        // The first DLE was stray; this one may open a pair.
                        self.discarded_bytes += 1;
                    }
                    _ => {
                        self.discarded_bytes += 2;
                        self.state = State::Hunt;
                    }
                },
                State::Body => {
                    if byte == DLE {
                        self.state = State::BodyDle;
                    } else {
                        self.body.push(byte);
                    }
                }
                State::BodyDle => match byte {
                    DLE => {
                        self.body.push(DLE);
                        self.state = State::Body;
                    }
                    ETX => {
                        self.state = State::Hunt;
                        if let Some(frame) = self.finish_frame() {
                            return Some(DecoderEvent::Frame(frame));
                        }
                    }
                    STX => {
                        // New frame start mid-body: drop the partial frame
                        // and resynchronise on this one.
                        self.framing_errors += 1;
                        warn!(partial = self.body.len(), "frame restarted mid-body");
                        self.body.clear();
                        self.state = State::Body;
                    }
                    ACK => {
                        self.framing_errors += 1;
                        warn!("ACK interrupted a frame body, partial frame dropped");
                        self.body.clear();
                        self.state = State::Hunt;
                        return Some(DecoderEvent::Ack);
                    }
                    NAK => {
                        self.framing_errors += 1;
                        warn!("NAK interrupted a frame body, partial frame dropped");
                        self.body.clear();
                        self.state = State::Hunt;
                        return Some(DecoderEvent::Nak);
                    }
                    other => {
                        self.framing_errors += 1;
                        warn!(
                            error = %ProtocolError::InvalidEscape(other),
                            "framing error, resynchronising"
                        );
                        self.body.clear();
                        self.state = State::Hunt;
                    }
                },
            }
        }
        None
    }

    /// Validate an unescaped body (`cmd | data | bytecount | checksum`).
    fn finish_frame(&mut self) -> Option<Frame> {
        let body = std::mem::take(&mut self.body);

        if body.len() < 3 {
            self.framing_errors += 1;
            warn!(
                error = %ProtocolError::FrameTooShort(body.len()),
                "frame discarded"
            );
            return None;
        }

        let byte_count = body[body.len() - 2] as usize;
        let data_len = body.len() - 3;
        if byte_count != data_len + 2 {
            self.framing_errors += 1;
            warn!(
                error = %ProtocolError::ByteCountMismatch {
                    expected: byte_count,
                    got: data_len + 2,
                },
                "frame discarded"
            );
            return None;
        }

        let expected = super::checksum(&body[..body.len() - 1]);
        let got = body[body.len() - 1];
        if expected != got {
            self.framing_errors += 1;
            warn!(
                error = %ProtocolError::ChecksumMismatch { expected, got },
                "frame discarded"
            );
            return None;
        }

        let cmd = body[0];
        let data = body[1..body.len() - 2].to_vec();
        debug!(cmd = format_args!("{cmd:#04x}"), len = data.len(), "frame decoded");
        Some(Frame { cmd, data })
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameDecoder {
    type Item = DecoderEvent;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.advance(src))
    }
}
