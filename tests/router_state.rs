//! Session layer tests - full stack against a scripted TCP router.
//!
//! A local TCP listener plays the SW-P-08 router: it link-ACKs every frame
//! the controller sends, records the frames for inspection, and injects
//! tallies and dumps on cue.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crossbar::config::RouterConfig;
use crossbar::error::{Error, LinkError};
use crossbar::protocol::{DecoderEvent, Frame, FrameDecoder, Message, TallyEntry};
use crossbar::router::{Router, RouterEvent};
use crossbar::transport::TcpConfig;
use crossbar::types::{CrosspointAddress, CrosspointStatus, MatrixLimits};

// ============================================================================
// Scripted router harness
// ============================================================================

struct TestRouter {
    frames: mpsc::Receiver<Frame>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    reader_task: JoinHandle<()>,
}

impl TestRouter {
    /// Receive the next frame the controller sent (already link-ACKed).
    async fn next_frame(&mut self) -> Message {
        let frame = timeout(Duration::from_secs(5), self.frames.recv())
            .await
            .expect("timed out waiting for controller frame")
            .expect("controller hung up");
        Message::from_frame(&frame).expect("controller sent unparseable frame")
    }

    async fn send(&self, message: &Message) {
        let wire = message.to_frame().encode().unwrap();
        self.writer.lock().await.write_all(&wire).await.unwrap();
    }

    /// Tear the connection down.
    async fn hang_up(self) {
        self.reader_task.abort();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Start a router session connected to a scripted TCP peer.
async fn start(limits: MatrixLimits) -> (Arc<Router>, TestRouter, broadcast::Receiver<RouterEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = RouterConfig {
        tcp: TcpConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            connect_timeout: Duration::from_secs(5),
        },
        reconnect_delay: Duration::from_millis(100),
        ..Default::default()
    };

    let router = Router::new(config, limits);
    let events = router.subscribe();

    let accept = tokio::spawn(async move { listener.accept().await });
    router.connect().await.unwrap();
    let (stream, _) = accept.await.unwrap().unwrap();

    let (read_half, write_half) = stream.into_split();
    let writer = Arc::new(Mutex::new(write_half));
    let (frame_tx, frame_rx) = mpsc::channel(64);

    // Router side: link-ACK every frame, forward it for inspection.
    let reader_task = {
        let writer = writer.clone();
        let mut read_half = read_half;
        tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut decoder = FrameDecoder::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = match read_half.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                for event in decoder.push(&buf[..n]) {
                    if let DecoderEvent::Frame(frame) = event {
                        writer
                            .lock()
                            .await
                            .write_all(&[0x10, 0x06])
                            .await
                            .expect("router ack");
                        if frame_tx.send(frame).await.is_err() {
                            return;
                        }
                    }
                }
            }
        })
    };

    (
        router,
        TestRouter {
            frames: frame_rx,
            writer,
            reader_task,
        },
        events,
    )
}

async fn next_event(events: &mut broadcast::Receiver<RouterEvent>) -> RouterEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for router event")
        .expect("event channel closed")
}

fn small_limits(max_levels: u8) -> MatrixLimits {
    MatrixLimits {
        max_sources: 64,
        max_destinations: 64,
        max_levels,
    }
}

fn tally(matrix: u8, level: u8, dest: u16, src: u16) -> Message {
    Message::Tally(TallyEntry {
        address: CrosspointAddress::new(matrix, level, dest, src),
        source_status: false,
    })
}

// ============================================================================
// Reconciliation
// ============================================================================

#[tokio::test]
async fn post_connect_reconciliation_requests_one_dump_per_level() {
    let (_router, mut peer, mut events) = start(small_limits(3)).await;

    assert!(matches!(next_event(&mut events).await, RouterEvent::Connected));

    let mut levels = Vec::new();
    for _ in 0..3 {
        match peer.next_frame().await {
            Message::TallyDumpRequest { matrix, level } => {
                assert_eq!(matrix, 0);
                levels.push(level);
            }
            other => panic!("expected dump request, got {other:?}"),
        }
    }
    assert_eq!(levels, vec![0, 1, 2]);
}

#[tokio::test]
async fn dump_reply_rebuilds_the_cache() {
    let (router, mut peer, mut events) = start(small_limits(1)).await;
    assert!(matches!(next_event(&mut events).await, RouterEvent::Connected));

    // Consume the reconciliation request, then answer it in byte form:
    // destinations 0..3 fed by sources 7, 9, 11.
    assert!(matches!(
        peer.next_frame().await,
        Message::TallyDumpRequest { matrix: 0, level: 0 }
    ));
    peer.send(&Message::TallyDumpByte {
        matrix: 0,
        level: 0,
        entries: [7u16, 9, 11]
            .iter()
            .enumerate()
            .map(|(dest, &src)| TallyEntry {
                address: CrosspointAddress::new(0, 0, dest as u16, src),
                source_status: false,
            })
            .collect(),
    })
    .await;

    // One change event per dump entry, in destination order.
    for expected_dest in 0..3u16 {
        match next_event(&mut events).await {
            RouterEvent::CrosspointChange(state) => {
                assert_eq!(state.address.destination, expected_dest);
                assert_eq!(state.status, CrosspointStatus::Connected);
            }
            other => panic!("expected crosspoint change, got {other:?}"),
        }
    }

    assert_eq!(router.get_all().len(), 3);
    assert_eq!(router.get(0, 0, 1).unwrap().address.source, 9);
    assert_eq!(router.status().crosspoint_count, 3);
}

// ============================================================================
// Takes
// ============================================================================

#[tokio::test]
async fn take_emits_pending_before_connected() {
    let (router, mut peer, mut events) = start(small_limits(1)).await;
    assert!(matches!(next_event(&mut events).await, RouterEvent::Connected));
    assert!(matches!(
        peer.next_frame().await,
        Message::TallyDumpRequest { .. }
    ));

    router.take(0, 0, 5, 10).await.unwrap();

    // Optimistic pending lands before any wire traffic returns.
    match next_event(&mut events).await {
        RouterEvent::CrosspointChange(state) => {
            assert_eq!(state.status, CrosspointStatus::Pending);
            assert_eq!(state.address.source, 10);
        }
        other => panic!("expected pending change, got {other:?}"),
    }

    // The Connect frame reaches the router, which confirms it.
    match peer.next_frame().await {
        Message::Connect(addr) => {
            assert_eq!(addr, CrosspointAddress::new(0, 0, 5, 10));
        }
        other => panic!("expected connect, got {other:?}"),
    }
    peer.send(&Message::Connected(TallyEntry {
        address: CrosspointAddress::new(0, 0, 5, 10),
        source_status: false,
    }))
    .await;

    match next_event(&mut events).await {
        RouterEvent::CrosspointChange(state) => {
            assert_eq!(state.status, CrosspointStatus::Connected);
        }
        other => panic!("expected connected change, got {other:?}"),
    }

    let state = router.get(0, 0, 5).unwrap();
    assert_eq!(state.status, CrosspointStatus::Connected);
    assert_eq!(state.address.source, 10);
}

#[tokio::test]
async fn late_tally_overrides_optimistic_state() {
    let (router, mut peer, mut events) = start(small_limits(1)).await;
    assert!(matches!(next_event(&mut events).await, RouterEvent::Connected));
    assert!(matches!(
        peer.next_frame().await,
        Message::TallyDumpRequest { .. }
    ));

    router.take(0, 0, 5, 10).await.unwrap();
    assert!(matches!(peer.next_frame().await, Message::Connect(_)));

    // The router disagrees: destination 5 stays on source 3.
    peer.send(&tally(0, 0, 5, 3)).await;

    loop {
        match next_event(&mut events).await {
            RouterEvent::CrosspointChange(state)
                if state.status == CrosspointStatus::Connected =>
            {
                assert_eq!(state.address.source, 3);
                break;
            }
            RouterEvent::CrosspointChange(_) => {} // the optimistic pending
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(router.get(0, 0, 5).unwrap().address.source, 3);
}

#[tokio::test]
async fn take_multi_issues_one_connect_per_level() {
    let (router, mut peer, mut events) = start(small_limits(3)).await;
    assert!(matches!(next_event(&mut events).await, RouterEvent::Connected));
    for _ in 0..3 {
        assert!(matches!(
            peer.next_frame().await,
            Message::TallyDumpRequest { .. }
        ));
    }

    router.take_multi(0, &[0, 1, 2], 4, 8).await.unwrap();

    let mut levels = Vec::new();
    for _ in 0..3 {
        match peer.next_frame().await {
            Message::Connect(addr) => {
                assert_eq!((addr.destination, addr.source), (4, 8));
                levels.push(addr.level);
            }
            other => panic!("expected connect, got {other:?}"),
        }
    }
    assert_eq!(levels, vec![0, 1, 2]);
}

#[tokio::test]
async fn take_rejects_out_of_range_synchronously() {
    let (router, _peer, mut events) = start(small_limits(1)).await;
    assert!(matches!(next_event(&mut events).await, RouterEvent::Connected));

    let err = router.take(0, 0, 64, 0).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(router.get(0, 0, 64).is_none());
}

// ============================================================================
// Interrogate
// ============================================================================

#[tokio::test]
async fn interrogate_resolves_with_the_next_matching_tally() {
    let (router, mut peer, mut events) = start(small_limits(1)).await;
    assert!(matches!(next_event(&mut events).await, RouterEvent::Connected));
    assert!(matches!(
        peer.next_frame().await,
        Message::TallyDumpRequest { .. }
    ));

    let asking = {
        let router = router.clone();
        tokio::spawn(async move { router.interrogate(0, 0, 5).await })
    };

    match peer.next_frame().await {
        Message::Interrogate {
            matrix,
            level,
            destination,
        } => {
            assert_eq!((matrix, level, destination), (0, 0, 5));
        }
        other => panic!("expected interrogate, got {other:?}"),
    }
    peer.send(&tally(0, 0, 5, 42)).await;

    assert_eq!(asking.await.unwrap().unwrap(), 42);
    assert_eq!(router.get(0, 0, 5).unwrap().address.source, 42);
}

// ============================================================================
// Disconnect
// ============================================================================

#[tokio::test]
async fn disconnect_fails_outstanding_interrogates() {
    let (router, mut peer, mut events) = start(small_limits(1)).await;
    assert!(matches!(next_event(&mut events).await, RouterEvent::Connected));
    assert!(matches!(
        peer.next_frame().await,
        Message::TallyDumpRequest { .. }
    ));

    let asking = {
        let router = router.clone();
        tokio::spawn(async move { router.interrogate(0, 0, 5).await })
    };
    assert!(matches!(peer.next_frame().await, Message::Interrogate { .. }));

    peer.hang_up().await;

    let err = asking.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Link(LinkError::Disconnected)));

    loop {
        match next_event(&mut events).await {
            RouterEvent::Disconnected => break,
            RouterEvent::CrosspointChange(_) | RouterEvent::Error(_) => {}
            RouterEvent::Connected => panic!("unexpected reconnect"),
        }
    }

    assert!(!router.is_connected());
    let err = router.take(0, 0, 1, 1).await.unwrap_err();
    assert!(matches!(err, Error::Link(LinkError::Disconnected)));
}
