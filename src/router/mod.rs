//! Session layer and router state model.
//!
//! Consumes decoder events from the link, maintains the crosspoint cache,
//! and exposes the typed command API (take, interrogate, tally dump). A
//! supervision loop keeps the link alive: connect, pump events until the
//! transport drops, then back off and retry.

mod cache;
mod labels;
mod salvos;

pub use cache::CrosspointCache;
pub use labels::LabelStore;
pub use salvos::SalvoStore;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::error::{LinkError, Result};
use crate::link::{self, LinkEvent, LinkHandle, ACK_TIMEOUT, MAX_ATTEMPTS};
use crate::protocol::{Frame, Message};
use crate::transport::{self, Transport};
use crate::types::{
    CrosspointAddress, CrosspointKey, CrosspointState, MatrixLimits, RouterStatus,
};

/// Pacing between tally dump requests during post-connect reconciliation,
/// sized to avoid flooding slow serial links.
const DUMP_PACING: Duration = Duration::from_millis(100);

/// How long an interrogate waits for its matching tally: twice the full
/// link-level retry budget.
pub fn interrogate_timeout() -> Duration {
    2 * ACK_TIMEOUT * (MAX_ATTEMPTS + 1)
}

/// Change events emitted by the session layer.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    /// A cache entry changed (optimistic pending write or router tally).
    CrosspointChange(CrosspointState),
    /// The link to the router came up.
    Connected,
    /// The link to the router went down.
    Disconnected,
    /// A command failed after the link gave up on it.
    Error(String),
}

type Waiter = (u64, oneshot::Sender<u16>);

/// The router session: command API over the link, tally cache underneath.
pub struct Router {
    config: RouterConfig,
    limits: MatrixLimits,
    cache: CrosspointCache,
    link: RwLock<Option<LinkHandle>>,
    connected: watch::Sender<bool>,
    events: broadcast::Sender<RouterEvent>,
    /// Interrogates waiting for the next matching tally.
    waiters: DashMap<CrosspointKey, Vec<Waiter>>,
    waiter_seq: AtomicU64,
}

impl Router {
    pub fn new(config: RouterConfig, limits: MatrixLimits) -> Arc<Self> {
        let (connected, _) = watch::channel(false);
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            config,
            limits,
            cache: CrosspointCache::new(),
            link: RwLock::new(None),
            connected,
            events,
            waiters: DashMap::new(),
            waiter_seq: AtomicU64::new(0),
        })
    }

    /// Subscribe to change events. Broadcasts reflect the order in which
    /// tallies were parsed from the router.
    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn limits(&self) -> MatrixLimits {
        self.limits
    }

    /// Snapshot for `get-status`.
    pub fn status(&self) -> RouterStatus {
        RouterStatus {
            connected: self.is_connected(),
            connection_type: self.config.transport.to_string(),
            crosspoint_count: self.cache.len(),
            last_update: self.cache.last_update(),
        }
    }

    // ------------------------------------------------------------------
    // Cache reads
    // ------------------------------------------------------------------

    pub fn get(&self, matrix: u8, level: u8, destination: u16) -> Option<CrosspointState> {
        self.cache.get(&CrosspointKey {
            matrix,
            level,
            destination,
        })
    }

    pub fn get_all(&self) -> Vec<CrosspointState> {
        self.cache.all()
    }

    pub fn get_by_level(&self, matrix: u8, level: u8) -> Vec<CrosspointState> {
        self.cache.by_level(matrix, level)
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Route `source` to `destination`. Optimistically records `pending`
    /// and emits the change before the router tallies; the Connect itself
    /// is fire-and-forget at this level, with link failures surfaced as
    /// [`RouterEvent::Error`].
    pub async fn take(
        self: &Arc<Self>,
        matrix: u8,
        level: u8,
        destination: u16,
        source: u16,
    ) -> Result<()> {
        self.limits.check(matrix, level, destination, source)?;
        let address = CrosspointAddress::new(matrix, level, destination, source);

        let state = self.cache.apply_pending(address);
        let _ = self.events.send(RouterEvent::CrosspointChange(state));

        let frame = Message::Connect(address).to_frame();
        self.dispatch(frame, move |e| format!("take {address} failed: {e}"))
            .await
    }

    /// One Connect per level; the levels need not be atomic on the wire.
    pub async fn take_multi(
        self: &Arc<Self>,
        matrix: u8,
        levels: &[u8],
        destination: u16,
        source: u16,
    ) -> Result<()> {
        for &level in levels {
            self.limits.check(matrix, level, destination, source)?;
        }
        for &level in levels {
            self.take(matrix, level, destination, source).await?;
        }
        Ok(())
    }

    /// Ask the router for the current source of a destination. Resolves
    /// with the source reported by the next matching tally.
    pub async fn interrogate(&self, matrix: u8, level: u8, destination: u16) -> Result<u16> {
        self.limits.check_destination(matrix, level, destination)?;
        let key = CrosspointKey {
            matrix,
            level,
            destination,
        };

        let id = self.waiter_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiters.entry(key).or_default().push((id, tx));

        let link = self.link_handle()?;
        let frame = Message::Interrogate {
            matrix,
            level,
            destination,
        }
        .to_frame();
        if let Err(e) = link.send(&frame).await {
            self.forget_waiter(key, id);
            return Err(e);
        }

        match timeout(interrogate_timeout(), rx).await {
            Ok(Ok(source)) => Ok(source),
            // Waiters are dropped when the link goes down.
            Ok(Err(_)) => Err(LinkError::Disconnected.into()),
            Err(_) => {
                self.forget_waiter(key, id);
                Err(LinkError::Timeout.into())
            }
        }
    }

    /// Request a full tally dump of one (matrix, level). The dump arrives
    /// asynchronously as tallies.
    pub async fn request_tally_dump(self: &Arc<Self>, matrix: u8, level: u8) -> Result<()> {
        self.limits.check_destination(matrix, level, 0)?;
        let frame = Message::TallyDumpRequest { matrix, level }.to_frame();
        self.dispatch(frame, move |e| {
            format!("tally dump m{matrix}/l{level} failed: {e}")
        })
        .await
    }

    /// Enqueue a frame fire-and-forget: link-level failure is reported as a
    /// router error event rather than a call-site error.
    async fn dispatch<F>(self: &Arc<Self>, frame: Frame, describe: F) -> Result<()>
    where
        F: FnOnce(LinkError) -> String + Send + 'static,
    {
        let link = self.link_handle()?;
        let ticket = link.submit(&frame).await?;

        let events = self.events.clone();
        tokio::spawn(async move {
            match ticket.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let message = describe(e);
                    warn!(%message, "command failed");
                    let _ = events.send(RouterEvent::Error(message));
                }
                // Link task died; the disconnect path reports it.
                Err(_) => {}
            }
        });
        Ok(())
    }

    fn link_handle(&self) -> Result<LinkHandle> {
        self.link
            .read()
            .clone()
            .ok_or_else(|| LinkError::Disconnected.into())
    }

    fn forget_waiter(&self, key: CrosspointKey, id: u64) {
        if let Some(mut waiters) = self.waiters.get_mut(&key) {
            waiters.retain(|(wid, _)| *wid != id);
        }
        self.waiters.remove_if(&key, |_, v| v.is_empty());
    }

    // ------------------------------------------------------------------
    // Link lifecycle
    // ------------------------------------------------------------------

    /// Open the configured transport and attach the link.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        let transport = transport::connect(
            self.config.transport,
            &self.config.tcp,
            &self.config.serial,
        )
        .await?;
        self.attach(transport);
        Ok(())
    }

    /// Attach an already-open transport. Spawns the link task, the event
    /// pump, and post-connect reconciliation.
    pub fn attach(self: &Arc<Self>, transport: Box<dyn Transport>) {
        let (handle, link_events, _join) = link::spawn(transport);
        *self.link.write() = Some(handle);
        self.connected.send_replace(true);
        let _ = self.events.send(RouterEvent::Connected);

        tokio::spawn(self.clone().pump_link_events(link_events));
        tokio::spawn(self.clone().reconcile());
    }

    async fn pump_link_events(self: Arc<Self>, mut link_events: mpsc::Receiver<LinkEvent>) {
        while let Some(event) = link_events.recv().await {
            match event {
                LinkEvent::Frame(frame) => self.handle_frame(&frame),
                LinkEvent::Disconnected { reason } => {
                    self.on_disconnect(&reason);
                    return;
                }
            }
        }
        self.on_disconnect("link event channel closed");
    }

    /// Parse one verified frame and apply it to the cache.
    fn handle_frame(&self, frame: &Frame) {
        let message = match Message::from_frame(frame) {
            Ok(message) => message,
            Err(e) => {
                // Unsolicited protocol errors do not break the link.
                warn!(cmd = format_args!("{:#04x}", frame.cmd), error = %e, "unparseable frame");
                return;
            }
        };

        match message {
            Message::Tally(entry) | Message::Connected(entry) => {
                let state = self.cache.apply_tally(entry);
                self.fulfil_waiters(&entry.address);
                let _ = self.events.send(RouterEvent::CrosspointChange(state));
            }
            Message::TallyDumpByte {
                matrix,
                level,
                entries,
            }
            | Message::TallyDumpWord {
                matrix,
                level,
                entries,
            } => {
                debug!(matrix, level, count = entries.len(), "tally dump received");
                for entry in entries {
                    let state = self.cache.apply_tally(entry);
                    self.fulfil_waiters(&entry.address);
                    let _ = self.events.send(RouterEvent::CrosspointChange(state));
                }
            }
            Message::ConnectOnGoAck(data) => {
                debug!(len = data.len(), "connect-on-go acknowledged");
            }
            Message::GoDoneAck(data) => {
                debug!(len = data.len(), "salvo go/done acknowledged");
            }
            Message::GroupSalvoTally(data) => {
                debug!(len = data.len(), "group salvo tally");
            }
            other => {
                debug!(command = %other.command(), "ignoring echoed command");
            }
        }
    }

    fn fulfil_waiters(&self, address: &CrosspointAddress) {
        if let Some((_, waiters)) = self.waiters.remove(&address.key()) {
            for (_, waiter) in waiters {
                let _ = waiter.send(address.source);
            }
        }
    }

    fn on_disconnect(&self, reason: &str) {
        if !self.connected.send_replace(false) {
            return;
        }
        info!(%reason, "router disconnected");
        *self.link.write() = None;
        // Dropping the senders fails outstanding interrogates with
        // Disconnected.
        self.waiters.clear();
        let _ = self.events.send(RouterEvent::Disconnected);
    }

    /// Rebuild the cache after a connect: one dump request per level on
    /// matrix 0, paced to keep slow serial links happy. Best-effort; a
    /// dropped dump leaves blanks for later tallies to fill.
    async fn reconcile(self: Arc<Self>) {
        for level in 0..self.limits.max_levels.min(16) {
            if !self.is_connected() {
                return;
            }
            if let Err(e) = self.request_tally_dump(0, level).await {
                debug!(level, error = %e, "reconciliation stopped");
                return;
            }
            tokio::time::sleep(DUMP_PACING).await;
        }
        debug!(levels = self.limits.max_levels, "reconciliation dumps requested");
    }

    /// Supervision loop: keep the link alive until shutdown.
    ///
    /// With `auto_connect` unset the loop idles; the fan-out keeps serving
    /// cache reads, labels, and salvos.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.auto_connect {
            info!("auto-connect disabled, router link idle");
            let _ = shutdown.recv().await;
            return;
        }

        let mut connected = self.connected.subscribe();
        loop {
            if !*connected.borrow() {
                match self.connect().await {
                    Ok(()) => {}
                    Err(e) => {
                        warn!(error = %e, "router connect failed");
                        let _ = self
                            .events
                            .send(RouterEvent::Error(format!("connect failed: {e}")));
                        tokio::select! {
                            () = tokio::time::sleep(self.config.reconnect_delay) => continue,
                            _ = shutdown.recv() => return,
                        }
                    }
                }
            }

            tokio::select! {
                changed = connected.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !*connected.borrow() {
                        tokio::select! {
                            () = tokio::time::sleep(self.config.reconnect_delay) => {}
                            _ = shutdown.recv() => return,
                        }
                    }
                }
                _ = shutdown.recv() => {
                    self.on_disconnect("shutdown");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrogate_timeout_covers_full_retry_budget() {
        assert_eq!(interrogate_timeout(), Duration::from_secs(12));
    }
}
