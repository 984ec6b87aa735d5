// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The client hub: a single WebSocket endpoint plus a companion
//! health HTTP endpoint, both bound to loopback only.

pub mod auth;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;

use crate::config::DaemonConfig;
use crate::protocol::{CommandEnvelope, Event};

/// Shared state every hub handler needs: a way to submit commands to the
/// attention core, a broadcast subscription point, and the config knobs
/// that govern queue depth / heartbeat / reply timeout.
pub struct HubState {
    pub cmd_tx: mpsc::UnboundedSender<CommandEnvelope>,
    pub broadcast_tx: broadcast::Sender<Event>,
    pub config: DaemonConfig,
}

/// Build the axum `Router` serving the daemon's loopback-only surface: the
/// `/ws` upgrade endpoint and a `/healthz` companion.
pub fn build_router(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/ws", get(ws::ws_upgrade_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}
