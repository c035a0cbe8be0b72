use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::relay_loop::RelayHandle;
use crate::session::SessionId;
use relay_shared::protocol::{Frame, Payload, WelcomeMsg, PROTOCOL_VERSION};

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub relay: RelayHandle,
    pub session_queue_capacity: usize,
    pub max_message_bytes: usize,
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.max_message_size(app_state.max_message_bytes)
        .max_frame_size(app_state.max_message_bytes)
        .on_upgrade(|socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let (outbox_tx, mut outbox_rx) = mpsc::channel::<Payload>(app_state.session_queue_capacity);
    let Some(session_id) = app_state.relay.connect(outbox_tx).await else {
        tracing::error!("Relay loop unavailable, refusing connection");
        return;
    };

    tracing::info!("Session {} connected", session_id);

    if send_welcome(&mut sink, session_id).await {
        loop {
            tokio::select! {
                // Client -> Relay
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => match Frame::decode(text.as_str()) {
                            Ok(frame) if frame.is_message() => {
                                if !app_state.relay.message(session_id, frame.data).await {
                                    break;
                                }
                            }
                            Ok(frame) => {
                                tracing::debug!("Session {} sent unknown event {:?}", session_id, frame.event);
                            }
                            Err(e) => {
                                tracing::debug!("Session {} sent undecodable frame: {}", session_id, e);
                            }
                        },
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            tracing::debug!("Session {} socket error: {}", session_id, e);
                            break;
                        }
                        _ => {} // Ignore ping/pong/binary
                    }
                }

                // Relay -> Client
                payload = outbox_rx.recv() => {
                    let Some(payload) = payload else {
                        break; // Removed from the registry
                    };
                    match Frame::message(payload).encode() {
                        Ok(json) => {
                            if sink.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!("Failed to encode message for session {}: {}", session_id, e),
                    }
                }
            }
        }
    }

    // Cleanup on disconnect
    app_state.relay.disconnect(session_id).await;
    tracing::info!("Session {} disconnected", session_id);
}

/// Tell the client its session id. Returns false if the socket is already gone.
async fn send_welcome(sink: &mut SplitSink<WebSocket, Message>, session_id: SessionId) -> bool {
    let welcome = WelcomeMsg {
        protocol_version: PROTOCOL_VERSION,
        server_version: env!("CARGO_PKG_VERSION").to_string(),
        session_id: session_id.get(),
    };
    match Frame::welcome(&welcome).and_then(|frame| frame.encode()) {
        Ok(json) => sink.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::warn!("Failed to encode welcome for session {}: {}", session_id, e);
            true
        }
    }
}
