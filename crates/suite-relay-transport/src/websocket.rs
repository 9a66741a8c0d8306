//! WebSocket message endpoint with per-message acks.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use suite_relay_core::Ack;
use suite_relay_session::EventRelay;
use tokio::sync::mpsc;

use crate::http::RelayState;
use crate::protocol::{ProtocolError, decode_message};

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: RelayState) {
    tracing::info!("WebSocket connection opened");
    let errors = state.relay.error_sink();
    let (mut sender, mut receiver) = socket.split();

    // Channel for acks going back to the client
    let (tx, mut rx) = mpsc::unbounded_channel::<Ack>();

    let ack_errors = Arc::clone(&errors);
    let send_task = tokio::spawn(async move {
        while let Some(ack) = rx.recv().await {
            let json = match serde_json::to_string(&ack) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize ack: {e}");
                    continue;
                }
            };
            tracing::debug!(message_id = %ack.id, "Sending ack");
            if let Err(e) = sender.send(WsMessage::Text(json.into())).await {
                ack_errors.report(format!("Error sending ack for [ {} ]: {e}", ack.id).into());
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text.to_string(),
            Ok(WsMessage::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => {
                    errors.report(Box::new(ProtocolError::NotUtf8));
                    continue;
                }
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!("WebSocket client error: {e}");
                errors.report(Box::new(e));
                break;
            }
        };

        let message = match decode_message(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid client message: {e}");
                errors.report(Box::new(e));
                continue;
            }
        };

        // Listeners are invoked here, in receipt order; only the wait and
        // the ack run in the background.
        let dispatch = state.relay.handle_message(&message);
        let tx = tx.clone();
        let errors = Arc::clone(&errors);
        tokio::spawn(async move {
            if let Err(e) = dispatch.await {
                errors.report(Box::new(e));
            }
            let _ = tx.send(Ack { id: message.id });
        });
    }

    send_task.abort();
    tracing::info!("WebSocket connection closed");
}

/// Create the WebSocket router.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_ws_router(relay));
/// ```
#[must_use]
pub fn create_ws_router(relay: Arc<EventRelay>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(RelayState::new(relay))
}
