//! Relay wire types
//!
//! The relay holds no game rules: payloads such as `pose` and ball state
//! are forwarded as opaque JSON with the sender's id attached.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Relay-assigned connection id
pub type ClientId = u64;

/// Messages a relay client may send
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RelayInbound {
    Pose {
        #[serde(default)]
        pose: Value,
        timestamp: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    BallHit {
        #[serde(default)]
        ball_velocity: Value,
        #[serde(default)]
        ball_position: Value,
        timestamp: Option<u64>,
    },
    Ping,
    /// Any other `type`; logged and ignored
    #[serde(other)]
    Unknown,
}

/// Messages the relay sends
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RelayOutbound {
    #[serde(rename_all = "camelCase")]
    Welcome {
        player_id: ClientId,
        total_players: usize,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    PlayerJoin {
        player_id: ClientId,
        total_players: usize,
        timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    PlayerLeave {
        player_id: ClientId,
        total_players: usize,
        timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    Pose {
        pose: Value,
        player_id: ClientId,
        timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    BallHit {
        ball_velocity: Value,
        ball_position: Value,
        player_id: ClientId,
        timestamp: u64,
    },
    Pong {
        timestamp: u64,
    },
}

/// The `type` field of a raw payload, for logging unknown messages
pub fn message_type(text: &str) -> Option<String> {
    serde_json::from_str::<Value>(text)
        .ok()?
        .get("type")?
        .as_str()
        .map(str::to_owned)
}
