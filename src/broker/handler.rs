//! Axum handlers: hub upgrade and health check.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PeerRegistry;
use super::connection::run_connection;
use crate::cancel::CancelSignal;
use crate::protocol::PeerRole;

/// Shared state of both broker listeners.
#[derive(Debug, Clone)]
pub struct BrokerState {
    /// Peers connected through either listener.
    pub registry: Arc<PeerRegistry>,
    /// Fired when the broker shuts down.
    pub shutdown: CancelSignal,
    /// Broker start time.
    pub started_at: DateTime<Utc>,
}

impl BrokerState {
    /// Creates state with an empty registry.
    #[must_use]
    pub fn new(shutdown: CancelSignal) -> Self {
        Self {
            registry: Arc::new(PeerRegistry::new()),
            shutdown,
            started_at: Utc::now(),
        }
    }
}

/// Handshake query: `?role=tool|application`.
#[derive(Debug, Deserialize)]
pub struct HubQuery {
    /// Role the connecting peer declares.
    pub role: PeerRole,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    started_at: String,
    peers: usize,
    tools: usize,
    applications: usize,
}

/// `GET <hub_path>?role=...`: upgrade to a relayed WebSocket.
pub async fn hub_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<HubQuery>,
    State(state): State<BrokerState>,
) -> impl IntoResponse {
    let registry = Arc::clone(&state.registry);
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| run_connection(socket, query.role, registry, shutdown))
}

/// `GET /health`: broker status and peer counts.
pub async fn health_handler(State(state): State<BrokerState>) -> impl IntoResponse {
    let registry = &state.registry;
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: state.started_at.to_rfc3339(),
            peers: registry.len().await,
            tools: registry.count_role(PeerRole::Tool).await,
            applications: registry.count_role(PeerRole::Application).await,
        }),
    )
}

/// Routes served on every broker listener.
pub fn routes(hub_path: &str) -> Router<BrokerState> {
    Router::new()
        .route("/health", get(health_handler))
        .route(hub_path, get(hub_handler))
}
