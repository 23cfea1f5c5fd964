//! WebSocket transport for the collaboration gateway

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use quill_core::core_collab::ServerEvent;

use crate::state::AppState;

/// GET /ws - credential travels in the `Authorization` header
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let credential = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    ws.on_upgrade(move |socket| handle_socket(socket, state, credential))
}

fn encode(event: &ServerEvent) -> Option<Message> {
    match event.to_json() {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            warn!(error = %e, "Failed to encode event");
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, credential: Option<String>) {
    let (mut sender, mut receiver) = socket.split();
    let (outbox, mut inbox) = mpsc::unbounded_channel();

    let session = match state.gateway.connect(credential.as_deref(), outbox).await {
        Ok(session) => session,
        Err(_) => {
            // Deliver the rejection, then close
            while let Ok(event) = inbox.try_recv() {
                if let Some(message) = encode(&event) {
                    let _ = sender.send(message).await;
                }
            }
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    // Resolves at once if shutdown was raised while connecting
    let shutdown = state.shutdown.clone();
    let stopped = shutdown.wait_for_shutdown();
    tokio::pin!(stopped);

    loop {
        tokio::select! {
            Some(event) = inbox.recv() => {
                if let Some(message) = encode(&event) {
                    if sender.send(message).await.is_err() {
                        break;
                    }
                }
            }
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => state.gateway.handle_text(&session, &text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(connection = session.connection_id, error = %e, "Socket error");
                    break;
                }
            },
            _ = &mut stopped => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    state.gateway.disconnect(&session).await;
}
