use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::state::AppState;

/// Push channel (GET /ws/{client_id})
///
/// Every connected client receives every job's progress events and filters
/// by `jobId` itself. The client id is only used for logging.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

async fn handle_socket(socket: WebSocket, client_id: String, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let subscriber = state.hub.register(Arc::new(tx));
    info!(client_id = %client_id, subscriber = %subscriber, "Push client connected");

    // All outbound traffic comes from hub broadcasts
    let forward_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames are read only to notice the disconnect
    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Close(_) => break,
            Message::Text(text) => debug!(client_id = %client_id, len = text.as_str().len(), "Ignoring client message"),
            _ => {}
        }
    }

    state.hub.unregister(subscriber);
    forward_task.abort();
    info!(client_id = %client_id, "Push client disconnected");
}
