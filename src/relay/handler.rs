//! WebSocket upgrade handler for the relay

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::util::rate_limit::ClientRateLimiter;
use crate::util::time::unix_millis;

use super::protocol::{message_type, ClientId, RelayInbound, RelayOutbound};
use super::RelayState;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: RelayState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (id, mut outbound_rx) = state.on_connect();

    // Writer task: outbound queue -> WebSocket
    let mut writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = ws_sink.send(msg).await {
                debug!(player_id = id, error = %e, "WebSocket send failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let rate_limiter = ClientRateLimiter::new(state.config.relay_msg_rate);

    // Reader loop: WebSocket -> fan-out
    let reader = async {
        while let Some(result) = ws_stream.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    if !rate_limiter.check_message() {
                        warn!(player_id = id, "Rate limited relay message");
                        continue;
                    }
                    handle_text(&state, id, &text);
                }
                Ok(Message::Binary(_)) => {
                    warn!(player_id = id, "Received binary message, ignoring");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    debug!(player_id = id, "Received control frame");
                }
                Ok(Message::Close(_)) => {
                    info!(player_id = id, "Client initiated close");
                    break;
                }
                Err(e) => {
                    error!(player_id = id, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    };

    // A reaped or shut-down client ends when its writer sends the close frame
    tokio::select! {
        _ = reader => {}
        _ = &mut writer_handle => {}
    }
    writer_handle.abort();

    state.on_disconnect(id);
}

/// Route one text frame from `id`
pub(crate) fn handle_text(state: &RelayState, id: ClientId, text: &str) {
    let msg = match serde_json::from_str::<RelayInbound>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(player_id = id, error = %e, "Failed to parse relay message");
            return;
        }
    };
    state.touch(id, unix_millis());

    match msg {
        RelayInbound::Pose { pose, timestamp } => {
            state.broadcast_others(
                id,
                &RelayOutbound::Pose {
                    pose,
                    player_id: id,
                    timestamp: timestamp.unwrap_or_else(unix_millis),
                },
            );
        }
        RelayInbound::BallHit {
            ball_velocity,
            ball_position,
            timestamp,
        } => {
            info!(player_id = id, "Ball hit");
            state.broadcast_all(&RelayOutbound::BallHit {
                ball_velocity,
                ball_position,
                player_id: id,
                timestamp: timestamp.unwrap_or_else(unix_millis),
            });
        }
        RelayInbound::Ping => {
            state.send_to(
                id,
                &RelayOutbound::Pong {
                    timestamp: unix_millis(),
                },
            );
        }
        RelayInbound::Unknown => {
            debug!(
                player_id = id,
                message_type = message_type(text).as_deref().unwrap_or("<missing>"),
                "Unknown relay message type"
            );
        }
    }
}
