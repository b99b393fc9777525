//! Campus Relay
//!
//! Real-time messaging service for the Campus student network:
//!
//! 1. **Live delivery**: clients hold one WebSocket each, authenticate with
//!    their user id, and send direct or group messages. The relay persists
//!    each message and pushes it to every online recipient.
//!
//! 2. **History & unread**: REST endpoints return conversation and group
//!    history, mark messages read, and report unread counts. Offline
//!    recipients catch up through these rather than a queue.
//!
//! 3. **Group membership**: create chat groups and add or remove members.

pub mod api;
pub mod extract;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod state;

use axum::{
    extract::{State, WebSocketUpgrade},
    http::Method,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::RelayState;

/// Build the HTTP router: socket endpoint, service endpoints and REST API.
pub fn router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route(
            "/api/users/:user_id/messages/:peer_id",
            get(api::get_conversation),
        )
        .route("/api/users/:user_id/unread", get(api::get_unread))
        .route("/api/users/:user_id/groups", get(api::get_user_groups))
        .route("/api/messages/:message_id/read", post(api::mark_message_read))
        .route("/api/groups", post(api::create_group))
        .route("/api/groups/:group_id", get(api::get_group))
        .route("/api/groups/:group_id/members", post(api::add_member))
        .route(
            "/api/groups/:group_id/members/:user_id",
            delete(api::remove_member),
        )
        .route(
            "/api/groups/:group_id/messages",
            get(api::get_group_messages),
        )
        .route("/api/groups/:group_id/read", post(api::mark_group_read))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// WebSocket upgrade handler for client connections.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_websocket(socket, state))
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "campus-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Statistics endpoint.
async fn stats_handler(State(state): State<RelayState>) -> impl IntoResponse {
    let online_clients = state.registry.online_count();

    match state.with_store(|store| store.stats()).await {
        Ok(stats) => Json(json!({
            "online_clients": online_clients,
            "direct_messages": stats.direct_messages,
            "group_messages": stats.group_messages,
            "chat_groups": stats.chat_groups,
        })),
        Err(e) => {
            tracing::error!(error = %e, "Failed to read store stats");
            Json(json!({
                "online_clients": online_clients,
            }))
        }
    }
}
