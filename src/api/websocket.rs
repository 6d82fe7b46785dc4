//! WebSocket bridge to the broadcast hub
//!
//! Each connection holds one hub subscription and forwards every event as a
//! JSON text frame. When the hub drops a slow subscriber its stream ends and
//! the socket is closed.

use super::handlers::AppState;
use crate::hub::Hub;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// GET /ws
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_connection(socket, hub))
}

async fn handle_connection(socket: WebSocket, hub: Hub) {
    let mut subscription = hub.subscribe().await;
    let client_id = subscription.id();
    info!(client_id, "websocket client connected");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = subscription.next().await {
            let text = match serde_json::to_string(event.as_ref()) {
                Ok(text) => text,
                Err(e) => {
                    error!("failed to serialize {} event: {}", event.kind(), e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                debug!(client_id, "client disconnected");
                return;
            }
        }
        // Hub dropped us or shut down
        let _ = sender.send(Message::Close(None)).await;
    });

    let mut receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(client_id, "websocket error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => receive_task.abort(),
        _ = &mut receive_task => send_task.abort(),
    }

    info!(client_id, "websocket client disconnected");
}
