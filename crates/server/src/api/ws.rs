//! WebSocket support for real-time dashboard updates.
//!
//! Clients receive the engine's event stream (job updates, aggregate
//! progress, run status changes, log lines) as tagged JSON messages.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use hibiki_core::EngineEvent;

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// Metric label for an engine event.
fn event_label(event: &EngineEvent) -> &'static str {
    match event {
        EngineEvent::JobUpdated { .. } => "job_updated",
        EngineEvent::Progress { .. } => "progress",
        EngineEvent::RunStatus { .. } => "run_status",
        EngineEvent::Log { .. } => "log",
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe to engine events
    let mut rx = state.broadcaster().subscribe();

    // Track connection metrics
    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    info!("WebSocket client connected");

    // Forward engine events to this client
    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    WS_MESSAGES_SENT
                        .with_label_values(&[event_label(&event)])
                        .inc();

                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                debug!("WebSocket send failed, client disconnected");
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Failed to serialize engine event: {}", e);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged, skipped {} events", n);
                    WS_LAG_EVENTS.inc();
                    // Keep receiving - the client catches up from the status endpoint
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Engine event channel closed");
                    break;
                }
            }
        }
    });

    // Handle incoming messages from client (ping/pong, close)
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Ping(data)) => {
                // Pong is handled automatically by axum
                debug!("Received ping: {:?}", data);
            }
            Ok(Message::Text(text)) => {
                // We don't expect any client messages, but log them
                debug!("Received text message: {}", text);
            }
            Ok(_) => {
                // Ignore other message types
            }
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    // Clean up
    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use hibiki_core::{LogLevel, RunStatus};

    #[test]
    fn test_event_labels() {
        assert_eq!(
            event_label(&EngineEvent::Progress {
                completed: 1,
                failed: 0,
                total: 2
            }),
            "progress"
        );
        assert_eq!(
            event_label(&EngineEvent::RunStatus {
                status: RunStatus::Running
            }),
            "run_status"
        );
        assert_eq!(
            event_label(&EngineEvent::Log {
                level: LogLevel::Info,
                message: "hello".to_string()
            }),
            "log"
        );
    }

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = EngineEvent::Progress {
            completed: 3,
            failed: 1,
            total: 10,
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["completed"], 3);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["total"], 10);
    }
}
