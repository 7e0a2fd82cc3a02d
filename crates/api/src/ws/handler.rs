use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde_json::json;

use codestream_core::stream_events::{
    MSG_TYPE_CONNECTION_ESTABLISHED, MSG_TYPE_ERROR, MSG_TYPE_PONG,
};

use crate::state::AppState;
use crate::ws::hub::SubscriptionHub;

/// Upgrade handler for `/ws/code-execution`: the hub generates a fresh
/// execution identifier for the subscriber.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub, None))
}

/// Upgrade handler for `/ws/code-execution/{execution_id}`: the
/// subscriber binds to a specific identifier.
pub async fn ws_handler_with_id(
    ws: WebSocketUpgrade,
    Path(execution_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub, Some(execution_id)))
}

/// Manage a single subscriber socket after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Binds the connection in the hub.
///   2. Confirms with a `connection_established` frame.
///   3. Spawns a sender task forwarding hub frames to the sink.
///   4. Processes inbound frames on the current task.
///   5. Unbinds on disconnect.
async fn handle_socket(
    socket: WebSocket,
    hub: Arc<SubscriptionHub>,
    execution_id: Option<String>,
) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (execution_id, mut rx) = hub.bind(conn_id.clone(), execution_id).await;
    tracing::info!(conn_id = %conn_id, execution_id = %execution_id, "Subscriber connected");

    let (mut sink, mut stream) = socket.split();

    let established = json!({
        "type": MSG_TYPE_CONNECTION_ESTABLISHED,
        "execution_id": execution_id,
        "message": "Connected to code execution stream",
    });
    if sink
        .send(Message::Text(established.to_string().into()))
        .await
        .is_err()
    {
        hub.unbind(&conn_id).await;
        return;
    }

    // Sender task: forward hub frames to the WebSocket sink in FIFO
    // order. Dropping `rx` on sink failure makes subsequent hub sends
    // fail, which unbinds this connection.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Receiver loop: process inbound frames.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                handle_client_frame(&hub, &conn_id, text.as_str()).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    hub.unbind(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "Subscriber disconnected");
}

/// Dispatch one inbound client frame.
///
/// `ping` gets a `pong` with the connection's current identifier;
/// `subscribe` rebinds the socket; malformed JSON gets an error frame.
/// Unknown frame types are ignored.
async fn handle_client_frame(hub: &SubscriptionHub, conn_id: &str, text: &str) {
    let frame: serde_json::Value = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => {
            hub.send_to_connection(
                conn_id,
                &json!({
                    "type": MSG_TYPE_ERROR,
                    "message": "Invalid JSON format",
                }),
            )
            .await;
            return;
        }
    };

    match frame["type"].as_str() {
        Some("ping") => {
            let execution_id = hub.execution_of(conn_id).await;
            hub.send_to_connection(
                conn_id,
                &json!({
                    "type": MSG_TYPE_PONG,
                    "timestamp": chrono::Utc::now(),
                    "execution_id": execution_id,
                }),
            )
            .await;
        }
        Some("subscribe") => {
            if let Some(execution_id) = frame["execution_id"].as_str() {
                if !execution_id.is_empty() {
                    hub.rebind(conn_id, execution_id.to_string()).await;
                    tracing::debug!(
                        conn_id = %conn_id,
                        execution_id = %execution_id,
                        "Subscriber rebound",
                    );
                }
            }
        }
        _ => {}
    }
}
