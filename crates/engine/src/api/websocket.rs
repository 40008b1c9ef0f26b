//! WebSocket handling for adventure clients.
//!
//! One socket = one session. The receive loop owns the session's
//! state machine; a separate send task forwards frames (JSON events
//! and raw prose chunks) from the session's channel to the socket.
//! Disconnect kills the receive loop immediately; already-spawned
//! background tasks run to completion best-effort and their output is
//! only consulted if the session is later resumed.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use taleweaver_domain::ConnectionId;
use taleweaver_shared::{ClientEnvelope, ServerMessage};

use crate::app::App;
use crate::use_cases::session::OutboundFrame;

use super::connections::ConnectionManager;

/// Buffer size for per-connection frame channel.
const CONNECTION_CHANNEL_BUFFER: usize = 256;

/// Combined state for WebSocket handlers.
pub struct WsState {
    pub app: Arc<App>,
    pub connections: Arc<ConnectionManager>,
}

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Client-generated resumption key.
    #[serde(default)]
    pub session: Option<String>,
}

/// WebSocket upgrade handler - entry point for new connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(state): State<Arc<WsState>>,
) -> Response {
    let user_token = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_token, params.session))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(
    socket: WebSocket,
    state: Arc<WsState>,
    user_token: Option<String>,
    client_key: Option<String>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let connection_id = ConnectionId::new();
    let user_id = state
        .app
        .identity
        .optional_user_id(user_token.as_deref());

    // Frames flow session -> channel -> socket; prose chunks go out as
    // raw text frames, everything else as JSON events.
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(CONNECTION_CHANNEL_BUFFER);

    state
        .connections
        .register(connection_id, user_id, client_key.clone());

    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let message = match frame {
                OutboundFrame::Chunk(text) => Message::Text(text.into()),
                OutboundFrame::Event(event) => match serde_json::to_string(&event) {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        tracing::error!(error = %e, "Could not serialize server message");
                        continue;
                    }
                },
            };
            if ws_sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut session = state
        .app
        .new_session(tx.clone(), user_id, client_key.clone());
    session.on_connect().await;

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEnvelope>(&text) {
                Ok(envelope) => {
                    session.handle_envelope(envelope).await;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "Failed to parse message");
                    let error = ServerMessage::Error {
                        message: format!("Invalid message format: {e}"),
                    };
                    let _ = tx.try_send(OutboundFrame::Event(error));
                }
            },
            Ok(Message::Ping(_)) => {
                // Axum answers pings at the protocol level.
            }
            Ok(Message::Close(_)) => {
                tracing::info!(connection_id = %connection_id, "WebSocket closed by client");
                break;
            }
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    // Disconnect terminates the receive loop; the session (and the
    // forwarder) go away with it, while spawned enrichment tasks hold
    // their own Arcs and finish on their own time.
    state.connections.unregister(connection_id);
    send_task.abort();

    tracing::info!(connection_id = %connection_id, "WebSocket connection terminated");
}
