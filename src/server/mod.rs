//! Client fan-out.
//!
//! Multiplexes many concurrent WebSocket clients onto the single router
//! session: commands flow down to the session layer, tally deltas broadcast
//! back up to every subscribed client. Labels and salvos live here as
//! fan-out collaborator state.

mod client;
mod messages;

pub use messages::{ClientEvent, ClientRequest, LabelRecord};

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::router::{LabelStore, Router, RouterEvent, SalvoStore};

/// Shared state handed to every client task.
#[derive(Clone)]
pub struct ServerState {
    pub router: Arc<Router>,
    pub labels: Arc<LabelStore>,
    pub salvos: Arc<SalvoStore>,
    pub broadcast: broadcast::Sender<ClientEvent>,
}

impl ServerState {
    pub fn new(router: Arc<Router>) -> Self {
        let (broadcast, _) = broadcast::channel(256);
        Self {
            router,
            labels: Arc::new(LabelStore::new()),
            salvos: Arc::new(SalvoStore::new()),
            broadcast,
        }
    }
}

/// Run the fan-out server until shutdown.
///
/// Spawns the router-event bridge and the periodic status broadcaster, then
/// serves the WebSocket endpoint.
pub async fn serve(
    state: ServerState,
    config: &ServerConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    tokio::spawn(bridge_router_events(state.clone()));
    tokio::spawn(broadcast_status(state.clone(), config.status_interval));

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .allowed_origin
                .parse::<axum::http::HeaderValue>()
                .map_err(|e| Error::InvalidConfig(format!("bad allowed_origin: {e}")))?,
        )
        .allow_methods(Any)
        .allow_headers(Any);

    let app = axum::Router::new()
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state);

    let listener = TcpListener::bind(config.listen).await?;
    info!(listen = %config.listen, "client fan-out listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .map_err(|e| Error::Internal(format!("fan-out server failed: {e}")))?;

    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    debug!("client connecting");
    ws.on_upgrade(move |socket| client::handle_socket(socket, state))
}

/// Re-broadcast session events to subscribed clients, in parse order.
async fn bridge_router_events(state: ServerState) {
    let mut events = state.router.subscribe();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "fan-out lagged behind router events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };

        let outbound = match event {
            RouterEvent::CrosspointChange(crosspoint) => {
                ClientEvent::CrosspointChange { crosspoint }
            }
            RouterEvent::Connected => ClientEvent::RouterConnected,
            RouterEvent::Disconnected => ClientEvent::RouterDisconnected,
            RouterEvent::Error(message) => ClientEvent::RouterError { id: None, message },
        };
        let _ = state.broadcast.send(outbound);
    }
}

/// Periodic `status-update` broadcast.
async fn broadcast_status(state: ServerState, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let _ = state.broadcast.send(ClientEvent::StatusUpdate {
            id: None,
            status: state.router.status(),
        });
    }
}
