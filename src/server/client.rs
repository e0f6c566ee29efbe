//! Per-client connection handling.
//!
//! Each WebSocket client gets one task that interleaves its own requests
//! with the shared broadcast stream. Only clients that have subscribed
//! receive broadcasts; query replies always go back regardless.

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::types::{LabelKey, Salvo};

use super::messages::{ClientEvent, ClientRequest, LabelRecord};
use super::ServerState;

/// Drive one client connection until it closes.
pub(super) async fn handle_socket(mut socket: WebSocket, state: ServerState) {
    let mut subscribed = false;
    let mut broadcasts = state.broadcast.subscribe();

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    let replies = match serde_json::from_str::<ClientRequest>(&text) {
                        Ok(request) => handle_request(&state, &mut subscribed, request).await,
                        Err(e) => {
                            // Unknown events are ignored without
                            // disconnecting the client.
                            debug!(error = %e, "ignoring unrecognised client message");
                            Vec::new()
                        }
                    };
                    for reply in replies {
                        if send_event(&mut socket, &reply).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => return,
                Some(Ok(_)) => {} // binary/ping/pong
                Some(Err(e)) => {
                    trace!(error = %e, "client socket error");
                    return;
                }
            },

            event = broadcasts.recv() => match event {
                Ok(event) => {
                    if subscribed && send_event(&mut socket, &event).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "client fell behind the broadcast stream");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}

async fn send_event(
    socket: &mut WebSocket,
    event: &ClientEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).expect("client events serialize");
    socket.send(WsMessage::Text(json.into())).await
}

/// Apply one client request, returning the replies owed to that client.
/// Broadcast side effects (label/salvo changes) go out through the shared
/// channel.
pub(super) async fn handle_request(
    state: &ServerState,
    subscribed: &mut bool,
    request: ClientRequest,
) -> Vec<ClientEvent> {
    match request {
        ClientRequest::TakeCrosspoint {
            id,
            matrix,
            level,
            destination,
            source,
        } => match state.router.take(matrix, level, destination, source).await {
            Ok(()) => ok_reply(id),
            Err(e) => error_reply(id, e),
        },

        ClientRequest::TakeMultiLevel {
            id,
            matrix,
            levels,
            destination,
            source,
        } => match state
            .router
            .take_multi(matrix, &levels, destination, source)
            .await
        {
            Ok(()) => ok_reply(id),
            Err(e) => error_reply(id, e),
        },

        ClientRequest::QueryCrosspoint {
            id,
            matrix,
            level,
            destination,
        } => vec![ClientEvent::CrosspointState {
            id,
            crosspoint: state.router.get(matrix, level, destination),
        }],

        ClientRequest::SetLabel {
            id,
            target,
            matrix,
            level,
            index,
            label,
        } => {
            let key = LabelKey {
                target,
                matrix,
                level,
                index,
            };
            state.labels.set(key, label.clone());
            let record = LabelRecord {
                target,
                matrix,
                level,
                index,
                label,
            };
            let _ = state.broadcast.send(ClientEvent::LabelChange { label: record });
            ok_reply(id)
        }

        ClientRequest::GetLabel {
            id,
            target,
            matrix,
            level,
            index,
        } => {
            let key = LabelKey {
                target,
                matrix,
                level,
                index,
            };
            let label = state.labels.get(&key).map(|label| LabelRecord {
                target,
                matrix,
                level,
                index,
                label,
            });
            vec![ClientEvent::Label { id, label }]
        }

        ClientRequest::GetAllLabels { id } => {
            let labels = state
                .labels
                .all()
                .into_iter()
                .map(|(key, label)| LabelRecord {
                    target: key.target,
                    matrix: key.matrix,
                    level: key.level,
                    index: key.index,
                    label,
                })
                .collect();
            vec![ClientEvent::Labels { id, labels }]
        }

        ClientRequest::CreateSalvo {
            id,
            salvo_id,
            name,
            crosspoints,
        } => {
            let salvo = Salvo {
                id: salvo_id,
                name,
                crosspoints,
            };
            state.salvos.upsert(salvo.clone());
            let _ = state.broadcast.send(ClientEvent::SalvoChange { salvo });
            ok_reply(id)
        }

        ClientRequest::ExecuteSalvo { id, salvo_id } => {
            let Some(salvo) = state.salvos.get(salvo_id) else {
                return error_reply(id, crate::error::Error::SalvoNotFound(salvo_id));
            };

            // Fan the entries out as concurrent takes; done once every take
            // is enqueued, not when tallies return.
            let takes = salvo.crosspoints.iter().map(|entry| {
                state
                    .router
                    .take(0, entry.level, entry.destination, entry.source)
            });
            let failed = join_all(takes)
                .await
                .into_iter()
                .find_map(std::result::Result::err);

            match failed {
                None => ok_reply(id),
                Some(e) => error_reply(id, e),
            }
        }

        ClientRequest::GetAllSalvos { id } => vec![ClientEvent::Salvos {
            id,
            salvos: state.salvos.all(),
        }],

        ClientRequest::GetStatus { id } => vec![ClientEvent::StatusUpdate {
            id,
            status: state.router.status(),
        }],

        ClientRequest::GetAllCrosspoints { id } => vec![ClientEvent::CrosspointUpdate {
            id,
            crosspoints: state.router.get_all(),
        }],

        ClientRequest::GetCrosspointsByLevel { id, matrix, level } => {
            vec![ClientEvent::CrosspointUpdate {
                id,
                crosspoints: state.router.get_by_level(matrix, level),
            }]
        }

        ClientRequest::Subscribe => {
            *subscribed = true;
            Vec::new()
        }

        ClientRequest::Unsubscribe => {
            *subscribed = false;
            Vec::new()
        }
    }
}

fn ok_reply(id: Option<u64>) -> Vec<ClientEvent> {
    id.map(|id| ClientEvent::Ok { id }).into_iter().collect()
}

fn error_reply(id: Option<u64>, error: crate::error::Error) -> Vec<ClientEvent> {
    vec![ClientEvent::RouterError {
        id,
        message: error.to_string(),
    }]
}
