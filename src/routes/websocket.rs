use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

/// 弹窗推送 WebSocket
pub async fn popup_stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let connection_id = format!("conn_{}", uuid::Uuid::new_v4());
    info!("Popup stream upgrade request: {}", connection_id);

    ws.on_upgrade(move |socket| handle_popup_connection(socket, state, connection_id))
}

async fn handle_popup_connection(socket: WebSocket, state: Arc<AppState>, connection_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut popups = state.agent.subscribe_popups();

    loop {
        tokio::select! {
            popup = popups.recv() => {
                let popup = match popup {
                    Ok(popup) => popup,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Popup stream {} lagged, skipped {} popup(s)", connection_id, skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let text = match serde_json::to_string(&popup) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to serialize popup: {}", e);
                        continue;
                    }
                };

                if ws_tx.send(Message::Text(text)).await.is_err() {
                    debug!("Popup stream {} closed by client", connection_id);
                    break;
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Popup stream {} receive error: {}", connection_id, e);
                        break;
                    }
                }
            }
        }
    }

    info!("Popup stream closed: {}", connection_id);
}
