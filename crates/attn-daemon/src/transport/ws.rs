// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-client WebSocket connection: auth, an `initial_state`
//! snapshot, broadcast fan-out with backpressure handling, heartbeats, and
//! command dispatch with a bounded reply timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};

use super::auth;
use super::HubState;
use crate::error::DaemonError;
use crate::protocol::{Command, CommandEnvelope, Event, PROTOCOL_VERSION};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
    pub protocol_version: Option<u32>,
}

/// `GET /ws`. Requires the shared bearer token and a
/// matching `protocol_version` before the upgrade completes.
pub async fn ws_upgrade_handler(
    State(hub): State<Arc<HubState>>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(expected) = hub.config.auth_token.as_deref() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "auth token not configured").into_response();
    };
    if let Err(e) = auth::validate_token(&headers, query.token.as_deref(), expected) {
        return (StatusCode::UNAUTHORIZED, e.message().to_owned()).into_response();
    }
    if let Some(client_version) = query.protocol_version {
        if client_version != PROTOCOL_VERSION {
            return (
                StatusCode::BAD_REQUEST,
                format!("protocol_version mismatch: daemon={PROTOCOL_VERSION} client={client_version}"),
            )
                .into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_connection(socket, hub))
}

/// Per-client outgoing queue depth beyond which the client is
/// disconnected for being slow, rather than the core ever blocking on it.
async fn handle_connection(socket: WebSocket, hub: Arc<HubState>) {
    let (mut sink, mut stream) = socket.split();
    let queue_capacity = hub.config.client_queue_capacity;
    let heartbeat_interval = hub.config.heartbeat_interval();
    let reply_timeout = hub.config.command_reply_timeout();

    let (out_tx, mut out_rx) = mpsc::channel::<OutMsg>(queue_capacity);
    let slow_client = Arc::new(AtomicBool::new(false));

    // Initial snapshot, fetched through the same command
    // path as any client query so the core stays the sole source of truth.
    let Ok(snapshot) = dispatch(&hub, Command::Snapshot).await else {
        return;
    };
    if out_tx.send(OutMsg::Event(snapshot)).await.is_err() {
        return;
    }

    // Forwards core broadcasts into this client's bounded queue. A full
    // queue means the client can't keep up; it is disconnected rather than
    // letting the core ever wait on it.
    let mut broadcast_rx = hub.broadcast_tx.subscribe();
    let forward_out_tx = out_tx.clone();
    let forward_slow = Arc::clone(&slow_client);
    let forwarder = tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(event) => {
                    if forward_out_tx.try_send(OutMsg::Event(event)).is_err() {
                        forward_slow.store(true, Ordering::SeqCst);
                        let _ = forward_out_tx
                            .send(OutMsg::Close {
                                code: 1008,
                                reason: "slow_client".to_owned(),
                            })
                            .await;
                        return;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    forward_slow.store(true, Ordering::SeqCst);
                    let _ = forward_out_tx
                        .send(OutMsg::Close { code: 1008, reason: "slow_client".to_owned() })
                        .await;
                    return;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    });

    // Preserves submission order for command replies independent of how long any one
    // command takes to complete on the core.
    let (order_tx, mut order_rx) = mpsc::unbounded_channel::<PendingReply>();
    let order_out_tx = out_tx.clone();
    let order_task = tokio::spawn(async move {
        while let Some(pending) = order_rx.recv().await {
            let event = match tokio::time::timeout(reply_timeout, pending.reply).await {
                Ok(Ok(Ok(event))) => event,
                Ok(Ok(Err(err))) => Event::CommandError { cmd: pending.cmd, error: err.message().to_owned() },
                Ok(Err(_)) => Event::CommandError { cmd: pending.cmd, error: "internal: core dropped reply".to_owned() },
                Err(_) => Event::CommandError { cmd: pending.cmd, error: "timeout".to_owned() },
            };
            if order_out_tx.send(OutMsg::Event(event)).await.is_err() {
                return;
            }
        }
    });

    // Writer: the only task that ever touches the socket's sink half.
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            match msg {
                OutMsg::Event(event) => {
                    let Ok(json) = serde_json::to_string(&event) else { continue };
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                OutMsg::Close { code, reason } => {
                    let _ = sink
                        .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    let mut last_heartbeat = Instant::now();
    let mut heartbeat_check = tokio::time::interval(Duration::from_secs(1));

    'reader: loop {
        if slow_client.load(Ordering::SeqCst) {
            break;
        }
        tokio::select! {
            _ = heartbeat_check.tick() => {
                if last_heartbeat.elapsed() > heartbeat_interval * 2 {
                    let _ = out_tx.send(OutMsg::Close { code: 1008, reason: "heartbeat_timeout".to_owned() }).await;
                    break 'reader;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_heartbeat_or_command(&text, &hub, &order_tx, &mut last_heartbeat).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break 'reader,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break 'reader,
                }
            }
        }
    }

    drop(out_tx);
    forwarder.abort();
    order_task.abort();
    let _ = writer.await;
}

enum OutMsg {
    Event(Event),
    Close { code: u16, reason: String },
}

struct PendingReply {
    cmd: String,
    reply: oneshot::Receiver<Result<Event, DaemonError>>,
}

async fn last_heartbeat_or_command(
    text: &str,
    hub: &Arc<HubState>,
    order_tx: &mpsc::UnboundedSender<PendingReply>,
    last_heartbeat: &mut Instant,
) {
    let command: Command = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(_) => {
            // Unknown/malformed discriminator: ignore rather than tearing
            // down the connection.
            return;
        }
    };
    if matches!(command, Command::Heartbeat { .. }) {
        *last_heartbeat = Instant::now();
    }
    let cmd_name = command.name().to_owned();
    let (reply_tx, reply_rx) = oneshot::channel();
    if hub.cmd_tx.send(CommandEnvelope { command, reply: reply_tx }).is_err() {
        return;
    }
    let _ = order_tx.send(PendingReply { cmd: cmd_name, reply: reply_rx });
}

async fn dispatch(hub: &Arc<HubState>, command: Command) -> Result<Event, ()> {
    let (reply_tx, reply_rx) = oneshot::channel();
    if hub.cmd_tx.send(CommandEnvelope { command, reply: reply_tx }).is_err() {
        return Err(());
    }
    reply_rx.await.map_err(|_| ())?.map_err(|_| ())
}
