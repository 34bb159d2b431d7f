//! WebSocket Hub (spec §4.4): accepts extension connections on `/ws`,
//! runs one reader/writer pump per connection, and dispatches decoded
//! envelopes to the registry or the pending table.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use cmb_protocol::{decode, encode, Envelope, EnvelopeType};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;

use crate::connection::Connection;
use crate::pending::PendingRequestTable;
use crate::registry::InstanceRegistry;

/// Shared state handed to the axum websocket route.
#[derive(Clone)]
pub struct HubState {
    pub registry: Arc<InstanceRegistry>,
    pub pending: Arc<PendingRequestTable>,
}

/// Axum handler for `GET /ws` — upgrades the connection and spawns its
/// reader/writer pump.
pub async fn websocket_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<HubState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Per-connection state, mirroring spec §4.4's state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Unregistered,
    Registered,
}

async fn handle_connection(socket: WebSocket, state: HubState) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let conn = Connection::new(outbound_tx);

    // "On Accepted, the server immediately emits a PONG as a connection
    // confirmation" (spec §4.4).
    conn.send(text_message(&Envelope::bare(EnvelopeType::Pong)));

    let mut conn_state = ConnState::Unregistered;
    let mut instance_id: Option<String> = None;

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(error = %e, "websocket read error, closing connection");
                break;
            }
        };

        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Binary(b) => match String::from_utf8(b.to_vec()) {
                Ok(t) => t,
                Err(_) => continue,
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let envelope = match decode(text.as_bytes()) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "protocol error decoding envelope, closing connection");
                conn.send(text_message(&Envelope::error_envelope(e.to_string(), None)));
                break;
            }
        };

        match conn_state {
            ConnState::Unregistered => match envelope.r#type {
                EnvelopeType::Ping => {
                    conn.send(text_message(&Envelope::bare(EnvelopeType::Pong)));
                }
                EnvelopeType::InstanceRegister => {
                    let id = state.registry.register(conn.clone(), envelope.instance_id.clone());
                    tracing::info!(instance_id = %id, "instance registered");
                    conn.send(text_message(&Envelope::response(
                        EnvelopeType::InstanceRegistered,
                        envelope.request_id.clone().unwrap_or_default(),
                        json!({
                            "instanceId": id,
                            "serverInfo": { "version": env!("CARGO_PKG_VERSION"), "timestamp": now_millis() },
                        }),
                    )));
                    instance_id = Some(id);
                    conn_state = ConnState::Registered;
                }
                other => {
                    tracing::warn!(?other, "non-PING envelope before registration, closing");
                    conn.send(text_message(&Envelope::error_envelope(
                        "expected INSTANCE_REGISTER before any other message",
                        None,
                    )));
                    break;
                }
            },
            ConnState::Registered => {
                state.registry.touch_by_connection(&conn);
                match envelope.r#type {
                    EnvelopeType::Ping => {
                        conn.send(text_message(&Envelope::bare(EnvelopeType::Pong)));
                    }
                    EnvelopeType::InstanceUnregister => {
                        tracing::info!(instance_id = ?instance_id, "instance unregistered");
                        break;
                    }
                    t if t.is_server_initiated_only() && envelope.request_id.is_some() => {
                        tracing::warn!(?t, "extension-originated request envelope, closing");
                        conn.send(text_message(&Envelope::error_envelope(
                            format!("{t:?} must be server-initiated"),
                            None,
                        )));
                        break;
                    }
                    EnvelopeType::Error => {
                        tracing::warn!(error = ?envelope.error, "ERROR envelope from instance");
                        if let Some(request_id) = &envelope.response_to_request_id {
                            state.pending.fail(
                                request_id,
                                cmb_core::BridgeError::Protocol(
                                    envelope.error.clone().unwrap_or_default(),
                                ),
                            );
                        }
                    }
                    _ if envelope.response_to_request_id.is_some() => {
                        deliver_response(&state, &envelope);
                    }
                    other => {
                        tracing::debug!(?other, "unhandled envelope in Registered state");
                    }
                }
            }
        }
    }

    state.registry.unregister_by_connection(&conn);
    if let Some(id) = instance_id {
        state.pending.fail_all_for_instance(&id);
    }
    writer.abort();
}

fn deliver_response(state: &HubState, envelope: &Envelope) {
    let Some(request_id) = &envelope.response_to_request_id else {
        return;
    };
    let status = envelope
        .payload
        .as_ref()
        .and_then(|p| p.get("status"))
        .and_then(|s| s.as_str());

    if status == Some("error") {
        let message = envelope
            .payload
            .as_ref()
            .and_then(|p| p.get("error"))
            .and_then(|e| e.as_str())
            .unwrap_or("instance reported an error")
            .to_string();
        state
            .pending
            .fail(request_id, cmb_core::BridgeError::Protocol(message));
    } else {
        state.pending.complete(
            request_id,
            envelope.payload.clone().unwrap_or(serde_json::Value::Null),
        );
    }
}

fn text_message(envelope: &Envelope) -> Message {
    Message::Text(String::from_utf8(encode(envelope)).unwrap_or_default().into())
}

fn now_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Spawn the periodic registry-eviction and pending-table-sweep tasks
/// (spec §4.2 `EvictIdle`, §4.3 `Sweep`). Returns their join handles so
/// the caller can abort them during shutdown.
pub fn spawn_background_tasks(
    state: HubState,
    idle_cutoff: Duration,
    sweep_interval: Duration,
) -> Vec<tokio::task::JoinHandle<()>> {
    let eviction_state = state.clone();
    let eviction = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let evicted = eviction_state.registry.evict_idle(idle_cutoff);
            for instance_id in evicted {
                tracing::info!(%instance_id, "evicted idle instance");
                eviction_state.pending.fail_all_for_instance(&instance_id);
            }
        }
    });

    let sweep_state = state;
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            sweep_state.pending.sweep();
        }
    });

    vec![eviction, sweeper]
}
