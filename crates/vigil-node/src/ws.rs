//! WebSocket endpoint for real-time fan-out.
//!
//! Each socket is one broker connection. The client steers its own topic
//! membership with small JSON frames:
//!
//! ```text
//! {"action": "join",  "topic": "feed"}
//! {"action": "leave", "topic": "incident:3f9a..."}
//! ```
//!
//! The server answers every client frame with an `ack` or `error` frame,
//! forwards broker envelopes as `event` frames and sends a `heartbeat` on a
//! fixed interval. Closing the socket drops the subscriber, which removes
//! all of its memberships.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use vigil_broker::{now_millis, Broker, Envelope, Subscriber, Topic};

use crate::node::NodeState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Join,
    Leave,
}

/// Frame sent by a client.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub action: Action,
    pub topic: String,
}

/// Frame sent to a client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame<'a> {
    /// A broker envelope, fields inlined next to the tag.
    Event(&'a Envelope),
    Ack {
        action: Action,
        topic: Topic,
        /// False when the join/leave was already in effect.
        changed: bool,
    },
    Error { message: String },
    Heartbeat { timestamp: u64 },
}

/// WebSocket handler for incident updates.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<NodeState>>,
) -> impl IntoResponse {
    let broker = state.engine.broker().clone();
    let heartbeat = state.config.heartbeat_interval;
    ws.on_upgrade(move |socket| handle_socket(socket, broker, heartbeat))
}

/// Apply one client frame to the subscriber's membership.
pub fn handle_client_frame(sub: &Subscriber, text: &str) -> ServerFrame<'static> {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            return ServerFrame::Error {
                message: format!("invalid frame: {e}"),
            }
        }
    };
    let topic: Topic = match frame.topic.parse() {
        Ok(topic) => topic,
        Err(e) => {
            return ServerFrame::Error {
                message: format!("{e}"),
            }
        }
    };

    let changed = match frame.action {
        Action::Join => sub.join(topic.clone()),
        Action::Leave => sub.leave(&topic),
    };
    debug!(conn = %sub.id(), action = ?frame.action, %topic, changed, "membership change");

    ServerFrame::Ack {
        action: frame.action,
        topic,
        changed,
    }
}

async fn handle_socket(mut socket: WebSocket, broker: Broker, heartbeat: Duration) {
    let mut sub = broker.connect();
    let conn = sub.id();
    info!(%conn, "WebSocket client connected");

    let mut ticker = tokio::time::interval(heartbeat);
    ticker.tick().await;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_frame(&sub, &text);
                        if let Err(e) = send_frame(&mut socket, &reply).await {
                            warn!(%conn, "Failed to send reply: {}", e);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            warn!(%conn, "Failed to send pong: {}", e);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(%conn, "WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            envelope = sub.recv() => {
                let Some(envelope) = envelope else { break };
                if let Err(e) = send_frame(&mut socket, &ServerFrame::Event(&envelope)).await {
                    warn!(%conn, "Failed to forward event: {}", e);
                    break;
                }
            }
            _ = ticker.tick() => {
                let beat = ServerFrame::Heartbeat { timestamp: now_millis() };
                if let Err(e) = send_frame(&mut socket, &beat).await {
                    warn!(%conn, "Failed to send heartbeat: {}", e);
                    break;
                }
            }
        }
    }

    info!(%conn, "WebSocket client disconnected");
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame<'_>) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).map_err(axum::Error::new)?;
    socket.send(Message::Text(json)).await
}
