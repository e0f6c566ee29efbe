//! Link layer tests - ARQ discipline over an in-memory transport.
//!
//! The far end of a `tokio::io::duplex` pipe plays the router, which lets
//! the tests observe every on-wire transmission and drive ACK/NAK timing
//! against a paused clock.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::Instant;

use crossbar::error::{LinkError, Result, TransportError};
use crossbar::link::{self, LinkEvent, ACK_TIMEOUT, MAX_ATTEMPTS};
use crossbar::protocol::{Frame, FrameDecoder, DecoderEvent};
use crossbar::transport::Transport;

// ============================================================================
// Test harness
// ============================================================================

/// In-memory transport over one end of a duplex pipe.
struct MemTransport {
    stream: Option<DuplexStream>,
}

#[async_trait]
impl Transport for MemTransport {
    async fn send(&mut self, data: &[u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        stream
            .write_all(data)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(data.len())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        let n = stream
            .read(buf)
            .await
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn transport_type(&self) -> &'static str {
        "mem"
    }

    fn endpoint(&self) -> String {
        "mem".into()
    }
}

/// The router side of the pipe.
struct FakeRouter {
    stream: DuplexStream,
    decoder: FrameDecoder,
}

impl FakeRouter {
    fn pair() -> (MemTransport, Self) {
        let (a, b) = tokio::io::duplex(4096);
        (
            MemTransport { stream: Some(a) },
            Self {
                stream: b,
                decoder: FrameDecoder::new(),
            },
        )
    }

    /// Read until one complete frame arrives from the controller.
    async fn expect_frame(&mut self) -> Frame {
        let mut buf = [0u8; 256];
        loop {
            let n = self.stream.read(&mut buf).await.expect("router read");
            assert!(n > 0, "controller hung up");
            for event in self.decoder.push(&buf[..n]) {
                match event {
                    DecoderEvent::Frame(frame) => return frame,
                    DecoderEvent::Ack | DecoderEvent::Nak => {}
                }
            }
        }
    }

    /// Read the controller's link-level ACK pair.
    async fn expect_wire_ack(&mut self) {
        let mut buf = [0u8; 256];
        loop {
            let n = self.stream.read(&mut buf).await.expect("router read");
            assert!(n > 0, "controller hung up");
            for event in self.decoder.push(&buf[..n]) {
                match event {
                    DecoderEvent::Ack => return,
                    other => panic!("expected wire ACK, got {other:?}"),
                }
            }
        }
    }

    async fn ack(&mut self) {
        self.stream.write_all(&[0x10, 0x06]).await.unwrap();
    }

    async fn nak(&mut self) {
        self.stream.write_all(&[0x10, 0x15]).await.unwrap();
    }

    async fn send_frame(&mut self, frame: &Frame) {
        self.stream
            .write_all(&frame.encode().unwrap())
            .await
            .unwrap();
    }
}

fn connect_frame() -> Frame {
    Frame::new(0x02, vec![0x00, 0x00, 0x05, 0x0A])
}

fn interrogate_frame() -> Frame {
    Frame::new(0x01, vec![0x00, 0x00, 0x05])
}

// ============================================================================
// Retry behaviour (spec scenarios: retry-then-success, retry exhaustion)
// ============================================================================

#[tokio::test(start_paused = true)]
async fn retry_then_success() {
    let (transport, mut router) = FakeRouter::pair();
    let (handle, _events, _join) = link::spawn(Box::new(transport));

    let started = Instant::now();
    let ticket = handle.submit(&connect_frame()).await.unwrap();

    // First transmission goes out immediately; the router stays silent.
    assert_eq!(router.expect_frame().await, connect_frame());

    // The retransmission arrives at the 1000 ms mark.
    let frame = router.expect_frame().await;
    assert_eq!(frame, connect_frame());
    let elapsed = started.elapsed();
    assert!(
        elapsed >= ACK_TIMEOUT && elapsed < ACK_TIMEOUT + Duration::from_millis(100),
        "retransmitted after {elapsed:?}"
    );

    // ACK at ~t+1200 ms resolves the command; nothing further is sent.
    tokio::time::sleep(Duration::from_millis(200)).await;
    router.ack().await;
    assert_eq!(ticket.await.unwrap(), Ok(()));

    // A subsequent command proves the slot is free and no stale
    // retransmission of the first is pending.
    let ticket = handle.submit(&interrogate_frame()).await.unwrap();
    assert_eq!(router.expect_frame().await, interrogate_frame());
    router.ack().await;
    assert_eq!(ticket.await.unwrap(), Ok(()));
}

#[tokio::test(start_paused = true)]
async fn retry_exhaustion_fails_with_timeout() {
    let (transport, mut router) = FakeRouter::pair();
    let (handle, _events, _join) = link::spawn(Box::new(transport));

    let started = Instant::now();
    let ticket = handle.submit(&connect_frame()).await.unwrap();

    // Transmissions at 0, 1000, 2000, 3000, 4000 ms: five in total.
    let mut stamps = Vec::new();
    for _ in 0..MAX_ATTEMPTS {
        assert_eq!(router.expect_frame().await, connect_frame());
        stamps.push(started.elapsed());
    }
    for (i, stamp) in stamps.iter().enumerate() {
        let expected = ACK_TIMEOUT * (i as u32);
        assert!(
            *stamp >= expected && *stamp < expected + Duration::from_millis(100),
            "transmission {i} at {stamp:?}"
        );
    }

    // Permanent failure lands at the 5000 ms mark.
    assert_eq!(ticket.await.unwrap(), Err(LinkError::Timeout));
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(4990) && elapsed <= Duration::from_millis(5200),
        "failed after {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn nak_retransmits_without_waiting_for_the_timer() {
    let (transport, mut router) = FakeRouter::pair();
    let (handle, _events, _join) = link::spawn(Box::new(transport));

    let started = Instant::now();
    let ticket = handle.submit(&connect_frame()).await.unwrap();
    assert_eq!(router.expect_frame().await, connect_frame());

    router.nak().await;
    assert_eq!(router.expect_frame().await, connect_frame());
    assert!(started.elapsed() < ACK_TIMEOUT);

    router.ack().await;
    assert_eq!(ticket.await.unwrap(), Ok(()));
}

// ============================================================================
// One-in-flight discipline
// ============================================================================

#[tokio::test(start_paused = true)]
async fn at_most_one_command_in_flight() {
    let (transport, mut router) = FakeRouter::pair();
    let (handle, _events, _join) = link::spawn(Box::new(transport));

    let first = handle.submit(&connect_frame()).await.unwrap();
    let second = handle.submit(&interrogate_frame()).await.unwrap();
    let third = handle
        .submit(&Frame::new(0x15, vec![0x00]))
        .await
        .unwrap();

    // Even after a full retry period only the first command has been on the
    // wire (twice).
    assert_eq!(router.expect_frame().await, connect_frame());
    assert_eq!(router.expect_frame().await, connect_frame());

    // FIFO release: ACKs let the queue drain in submission order.
    router.ack().await;
    assert_eq!(first.await.unwrap(), Ok(()));

    assert_eq!(router.expect_frame().await, interrogate_frame());
    router.ack().await;
    assert_eq!(second.await.unwrap(), Ok(()));

    assert_eq!(router.expect_frame().await, Frame::new(0x15, vec![0x00]));
    router.ack().await;
    assert_eq!(third.await.unwrap(), Ok(()));
}

// ============================================================================
// Receive path
// ============================================================================

#[tokio::test]
async fn unsolicited_tally_is_acked_and_forwarded() {
    let (transport, mut router) = FakeRouter::pair();
    let (_handle, mut events, _join) = link::spawn(Box::new(transport));

    let tally = Frame::new(0x03, vec![0x11, 0x08, 0x05, 0x00]);
    router.send_frame(&tally).await;

    router.expect_wire_ack().await;
    match events.recv().await.unwrap() {
        LinkEvent::Frame(frame) => assert_eq!(frame, tally),
        LinkEvent::Disconnected { reason } => panic!("disconnected: {reason}"),
    }
}

#[tokio::test]
async fn tallies_flow_while_a_command_waits_for_ack() {
    let (transport, mut router) = FakeRouter::pair();
    let (handle, mut events, _join) = link::spawn(Box::new(transport));

    let ticket = handle.submit(&connect_frame()).await.unwrap();
    assert_eq!(router.expect_frame().await, connect_frame());

    // Router tallies before acknowledging the command.
    let tally = Frame::new(0x04, vec![0x00, 0x00, 0x05, 0x0A]);
    router.send_frame(&tally).await;
    router.expect_wire_ack().await;
    match events.recv().await.unwrap() {
        LinkEvent::Frame(frame) => assert_eq!(frame, tally),
        LinkEvent::Disconnected { reason } => panic!("disconnected: {reason}"),
    }

    router.ack().await;
    assert_eq!(ticket.await.unwrap(), Ok(()));
}

// ============================================================================
// Disconnect behaviour
// ============================================================================

#[tokio::test]
async fn disconnect_drains_the_queue() {
    let (transport, router) = FakeRouter::pair();
    let (handle, mut events, _join) = link::spawn(Box::new(transport));

    let first = handle.submit(&connect_frame()).await.unwrap();
    let second = handle.submit(&interrogate_frame()).await.unwrap();

    drop(router);

    assert_eq!(first.await.unwrap(), Err(LinkError::Disconnected));
    assert_eq!(second.await.unwrap(), Err(LinkError::Disconnected));
    assert!(matches!(
        events.recv().await,
        Some(LinkEvent::Disconnected { .. })
    ));

    // Submissions after the link task exits fail immediately.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.submit(&connect_frame()).await.is_err());
}
