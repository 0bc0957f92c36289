//! WebSocket handler for the live telemetry feed

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::state::{AppState, TelemetryEvent};

/// WebSocket message types
#[derive(Serialize)]
#[serde(tag = "type", content = "data")]
enum WsMessage {
    #[serde(rename = "frame_accepted", rename_all = "camelCase")]
    FrameAccepted {
        device_id: String,
        sequence_id: u64,
        timestamp: u64,
    },
    #[serde(rename = "device_evicted")]
    DeviceEvicted { id: String },
    #[serde(rename = "device_removed")]
    DeviceRemoved { id: String },
    #[serde(rename = "pong")]
    Pong,
}

impl From<TelemetryEvent> for WsMessage {
    fn from(event: TelemetryEvent) -> Self {
        match event {
            TelemetryEvent::FrameAccepted {
                device_id,
                sequence_id,
                timestamp,
            } => WsMessage::FrameAccepted {
                device_id,
                sequence_id,
                timestamp,
            },
            TelemetryEvent::DeviceEvicted(id) => WsMessage::DeviceEvicted { id },
            TelemetryEvent::DeviceRemoved(id) => WsMessage::DeviceRemoved { id },
        }
    }
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.subscribe();

    info!("WebSocket client connected");

    loop {
        tokio::select! {
            // Forward telemetry events to client
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let msg = WsMessage::from(event);
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Telemetry event channel lagged");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Telemetry event channel closed");
                        break;
                    }
                }
            }

            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str() == "ping" {
                            if let Ok(pong) = serde_json::to_string(&WsMessage::Pong) {
                                if sender.send(Message::Text(pong.into())).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}
