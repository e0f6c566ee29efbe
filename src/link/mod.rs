//! ACK/NAK link layer.
//!
//! Runs the ARQ over one exclusive transport: at most one command in flight,
//! a FIFO queue behind it, a 1000 ms acknowledgement timer, and bounded
//! retransmission. The link task owns the transport, the frame decoder, and
//! the pending-command queue, which serialises decoding, transmission, and
//! queue mutation by construction. Callers talk to it through a cloneable
//! [`LinkHandle`].

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::{LinkError, Result};
use crate::protocol::{DecoderEvent, Frame, FrameDecoder, ACK, DLE};
use crate::transport::Transport;

/// Time to wait for a link-level ACK before retransmitting.
pub const ACK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Maximum on-wire transmissions of one command before it fails with
/// [`LinkError::Timeout`].
pub const MAX_ATTEMPTS: u32 = 5;

/// Wire bytes of the link-level positive acknowledge.
const ACK_WIRE: [u8; 2] = [DLE, ACK];

/// Read buffer size. Tally traffic is small; one dump reply fits easily.
const READ_BUF: usize = 4096;

/// Events delivered from the link to the session layer.
#[derive(Debug)]
pub enum LinkEvent {
    /// A verified data frame, already ACKed on the wire.
    Frame(Frame),
    /// The transport dropped; every pending command has been failed with
    /// [`LinkError::Disconnected`] and the task has exited.
    Disconnected { reason: String },
}

/// Completion of one submitted command, resolved on link-level ACK,
/// retry exhaustion, or disconnect.
pub type CommandTicket = oneshot::Receiver<std::result::Result<(), LinkError>>;

struct LinkRequest {
    cmd: u8,
    wire: Vec<u8>,
    done: oneshot::Sender<std::result::Result<(), LinkError>>,
}

/// Cloneable handle for submitting commands to the link task.
#[derive(Clone)]
pub struct LinkHandle {
    tx: mpsc::Sender<LinkRequest>,
}

impl LinkHandle {
    /// Queue a frame for transmission. The returned ticket resolves when the
    /// router ACKs the command or the link gives up on it.
    pub async fn submit(&self, frame: &Frame) -> Result<CommandTicket> {
        let wire = frame.encode()?;
        let (done, ticket) = oneshot::channel();
        self.tx
            .send(LinkRequest {
                cmd: frame.cmd,
                wire,
                done,
            })
            .await
            .map_err(|_| LinkError::Disconnected)?;
        Ok(ticket)
    }

    /// Submit and wait for link-level delivery.
    pub async fn send(&self, frame: &Frame) -> Result<()> {
        let ticket = self.submit(frame).await?;
        ticket
            .await
            .map_err(|_| LinkError::Disconnected)?
            .map_err(crate::error::Error::from)
    }
}

struct Pending {
    cmd: u8,
    wire: Vec<u8>,
    attempts: u32,
    deadline: Instant,
    done: oneshot::Sender<std::result::Result<(), LinkError>>,
}

/// Spawn the link task over an open transport.
///
/// Returns the command handle, the event stream, and the task handle. The
/// task exits when the transport fails or every `LinkHandle` is dropped.
pub fn spawn(
    transport: Box<dyn Transport>,
) -> (LinkHandle, mpsc::Receiver<LinkEvent>, JoinHandle<()>) {
    let (req_tx, req_rx) = mpsc::channel(64);
    let (event_tx, event_rx) = mpsc::channel(64);

    let task = LinkTask {
        transport,
        decoder: FrameDecoder::new(),
        requests: req_rx,
        events: event_tx,
        inflight: None,
        queue: VecDeque::new(),
    };
    let join = tokio::spawn(task.run());

    (LinkHandle { tx: req_tx }, event_rx, join)
}

struct LinkTask {
    transport: Box<dyn Transport>,
    decoder: FrameDecoder,
    requests: mpsc::Receiver<LinkRequest>,
    events: mpsc::Sender<LinkEvent>,
    inflight: Option<Pending>,
    queue: VecDeque<LinkRequest>,
}

impl LinkTask {
    async fn run(mut self) {
        let mut buf = [0u8; READ_BUF];

        let reason = loop {
            let deadline = self.inflight.as_ref().map(|p| p.deadline);

            tokio::select! {
                read = self.transport.recv(&mut buf) => match read {
                    Ok(0) => break "connection closed by router".to_string(),
                    Ok(n) => {
                        if let Err(reason) = self.on_bytes(&buf[..n]).await {
                            break reason;
                        }
                    }
                    Err(e) => break e.to_string(),
                },

                req = self.requests.recv() => match req {
                    Some(req) => {
                        self.queue.push_back(req);
                        if let Err(reason) = self.pump().await {
                            break reason;
                        }
                    }
                    // Every handle dropped: orderly shutdown.
                    None => break "link handle dropped".to_string(),
                },

                () = async { tokio::time::sleep_until(deadline.unwrap()).await },
                    if deadline.is_some() =>
                {
                    if let Err(reason) = self.on_timer().await {
                        break reason;
                    }
                }
            }
        };

        self.shutdown(reason).await;
    }

    /// Feed received bytes through the decoder and act on each event.
    /// Returns the failure reason if the transport dies underneath us.
    async fn on_bytes(&mut self, bytes: &[u8]) -> std::result::Result<(), String> {
        for event in self.decoder.push(bytes) {
            match event {
                DecoderEvent::Ack => self.on_ack().await?,
                DecoderEvent::Nak => self.on_nak().await?,
                DecoderEvent::Frame(frame) => {
                    // ACK on the wire before the frame is processed further.
                    self.transport
                        .send(&ACK_WIRE)
                        .await
                        .map_err(|e| e.to_string())?;
                    if self.events.send(LinkEvent::Frame(frame)).await.is_err() {
                        return Err("session receiver dropped".to_string());
                    }
                }
            }
        }
        Ok(())
    }

    async fn on_ack(&mut self) -> std::result::Result<(), String> {
        match self.inflight.take() {
            Some(pending) => {
                trace!(cmd = format_args!("{:#04x}", pending.cmd), "command acknowledged");
                let _ = pending.done.send(Ok(()));
                self.pump().await
            }
            None => {
                debug!("spurious ACK with nothing in flight");
                Ok(())
            }
        }
    }

    async fn on_nak(&mut self) -> std::result::Result<(), String> {
        match self.inflight.as_mut() {
            Some(_) => self.retransmit_or_fail("NAK").await,
            None => {
                debug!("spurious NAK with nothing in flight");
                Ok(())
            }
        }
    }

    async fn on_timer(&mut self) -> std::result::Result<(), String> {
        if self.inflight.is_some() {
            self.retransmit_or_fail("timeout").await
        } else {
            Ok(())
        }
    }

    /// Retransmit the in-flight command, or fail it permanently once its
    /// transmission budget is spent.
    async fn retransmit_or_fail(&mut self, cause: &str) -> std::result::Result<(), String> {
        let pending = self.inflight.as_mut().expect("in-flight command");

        if pending.attempts >= MAX_ATTEMPTS {
            let pending = self.inflight.take().expect("in-flight command");
            warn!(
                cmd = format_args!("{:#04x}", pending.cmd),
                attempts = pending.attempts,
                "command failed permanently"
            );
            let _ = pending.done.send(Err(LinkError::Timeout));
            return self.pump().await;
        }

        pending.attempts += 1;
        pending.deadline = Instant::now() + ACK_TIMEOUT;
        debug!(
            cmd = format_args!("{:#04x}", pending.cmd),
            attempt = pending.attempts,
            cause,
            "retransmitting"
        );
        let wire = pending.wire.clone();
        self.transport.send(&wire).await.map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Transmit the next queued command if nothing is in flight.
    async fn pump(&mut self) -> std::result::Result<(), String> {
        while self.inflight.is_none() {
            let Some(req) = self.queue.pop_front() else {
                return Ok(());
            };

            trace!(cmd = format_args!("{:#04x}", req.cmd), "transmitting");
            self.transport
                .send(&req.wire)
                .await
                .map_err(|e| e.to_string())?;

            self.inflight = Some(Pending {
                cmd: req.cmd,
                wire: req.wire,
                attempts: 1,
                deadline: Instant::now() + ACK_TIMEOUT,
                done: req.done,
            });
        }
        Ok(())
    }

    /// Fail everything pending and tell the session layer the link is gone.
    async fn shutdown(mut self, reason: String) {
        warn!(%reason, "link down");

        if let Some(pending) = self.inflight.take() {
            let _ = pending.done.send(Err(LinkError::Disconnected));
        }
        for req in self.queue.drain(..) {
            let _ = req.done.send(Err(LinkError::Disconnected));
        }
        self.requests.close();
        while let Ok(req) = self.requests.try_recv() {
            let _ = req.done.send(Err(LinkError::Disconnected));
        }

        let _ = self.transport.close().await;
        let _ = self.events.send(LinkEvent::Disconnected { reason }).await;
    }
}
