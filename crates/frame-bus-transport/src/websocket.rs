//! WebSocket bridge: one accepted socket, one remote child frame.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use uuid::Uuid;

use frame_bus_core::{Frame, FrameHandle, Inbound, ReplyEnvelope, WireMessage};

/// WebSocket handler state: where inbound envelopes are posted.
#[derive(Clone)]
pub struct WsState {
    /// Handle of the host agent's frame.
    pub host: FrameHandle,
}

impl WsState {
    #[must_use]
    pub fn new(host: FrameHandle) -> Self {
        Self { host }
    }
}

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();

    // The socket's frame. Dropping it (on disconnect) closes the handle,
    // which lets the host's registry prune this child.
    let mut frame = Frame::new(format!("ws:{}", Uuid::new_v4()));
    let child = frame.handle();

    // Forward replies and broadcasts addressed to this frame.
    let send_task = tokio::spawn(async move {
        while let Some(Inbound { message, .. }) = frame.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s.into(),
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        let message: WireMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid envelope: {e}");
                if let Some(reply) = invalid_envelope_reply(&text, &e.to_string()) {
                    let _ = child.post(&child, WireMessage::Reply(reply));
                }
                continue;
            }
        };

        if state.host.post(&child, message).is_err() {
            tracing::warn!("Host frame gone, closing socket");
            break;
        }
    }

    send_task.abort();
}

/// Build a failure reply for an unparseable envelope, if enough of it can
/// be recovered to correlate.
fn invalid_envelope_reply(text: &str, error: &str) -> Option<ReplyEnvelope> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let message_id = value.get("messageId")?.as_str()?.parse::<Uuid>().ok()?;
    let app_key = value.get("appKey").and_then(|v| v.as_str()).unwrap_or("");
    Some(ReplyEnvelope::failure(
        message_id,
        app_key,
        format!("invalid envelope: {error}"),
    ))
}

/// Create a WebSocket router serving the bus at `/ws`.
///
/// # Example
/// ```ignore
/// let app = Router::new().merge(create_ws_router(host.handle()));
/// ```
#[must_use]
pub fn create_ws_router(host: FrameHandle) -> axum::Router {
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(WsState::new(host))
}
