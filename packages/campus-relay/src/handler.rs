//! WebSocket connection handler.
//!
//! Owns the socket for the lifetime of a connection: splits it, drains the
//! session's outbound channel into the sink, and feeds inbound frames to
//! the [`Session`] one at a time in arrival order.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::protocol::ServerFrame;
use crate::session::Session;
use crate::state::RelayState;

/// Handle a single WebSocket connection.
///
/// 1. Spawns a writer task that serializes outbound frames
/// 2. Processes incoming frames until the connection closes
/// 3. Releases the registry entry if this connection still owns it
pub async fn handle_websocket(socket: WebSocket, state: RelayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create the outbound channel for this client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();
    let mut session = Session::new(state, tx);
    let connection_id = session.connection_id();

    tracing::debug!(connection_id = %connection_id, "WebSocket connected");

    // ── Writer Task ───────────────────────────────────────────────────────

    let sender_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize server frame");
                }
            }
        }
    });

    // ── Process Frames ────────────────────────────────────────────────────

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => session.handle_text(&text).await,
            Ok(Message::Binary(data)) => session.handle_binary(data.len()),
            Ok(Message::Close(_)) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    user_id = ?session.user_id(),
                    "Client sent close frame"
                );
                break;
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    user_id = ?session.user_id(),
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
            // Ping/Pong are answered by the transport
            _ => {}
        }
    }

    // ── Cleanup ───────────────────────────────────────────────────────────

    session.close();
    sender_task.abort();
    tracing::info!(
        connection_id = %connection_id,
        user_id = ?session.user_id(),
        "WebSocket disconnected"
    );
}
