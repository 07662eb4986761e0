use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /health — liveness probe, returning this bridge's own notion of
/// status rather than any upstream-provider health.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "protocol": wabridge_protocol::frames::PROTOCOL_VERSION,
        "ws_connections": state.ws_connections.load(Ordering::SeqCst),
        "sessions_running": state.sessions.list().len(),
        "media_cache_entries": state.media.len(),
    }))
}
