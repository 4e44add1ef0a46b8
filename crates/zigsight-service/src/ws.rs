//! WebSocket handler for real-time updates.
//!
//! A client first receives a snapshot with one `device` message per tracked
//! device, then every [`DeviceEvent`] as it is published.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use zigsight_core::{DeviceEvent, DeviceRecord};

use crate::state::AppState;

/// Create the WebSocket router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/ws", get(ws_handler))
}

/// A message sent to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum WsMessage {
    /// Snapshot entry for one device.
    Snapshot(SnapshotMessage),
    /// A live store event.
    Event(DeviceEvent),
}

/// Snapshot entry, tagged like the live events.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub device: DeviceRecord,
}

impl WsMessage {
    fn snapshot(device: DeviceRecord) -> Self {
        WsMessage::Snapshot(SnapshotMessage {
            kind: "device",
            device,
        })
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so no event falls between the two.
    let mut rx = state.events.subscribe();

    info!("WebSocket client connected");

    let snapshot: Vec<WsMessage> = {
        let store = state.store.read().await;
        store
            .devices()
            .values()
            .cloned()
            .map(WsMessage::snapshot)
            .collect()
    };
    for message in &snapshot {
        let Ok(json) = serde_json::to_string(message) else {
            continue;
        };
        if sender.send(Message::Text(json.into())).await.is_err() {
            info!("WebSocket client disconnected during initial snapshot");
            return;
        }
    }

    debug!("Sent snapshot of {} device(s) to WebSocket client", snapshot.len());

    let shutdown = state.shutdown.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => event,
            };
            let event = match event {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged, missed {} events", n);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let json = match serde_json::to_string(&WsMessage::Event(event)) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
        },
    }

    info!("WebSocket client disconnected");
}
