//! Peer wire messages carried over the data channel
//!
//! Control messages are tagged by `type`; the per-tick swing message has no
//! tag and is recognised by its `t`/`id`/`swing` shape.

use serde::{Deserialize, Serialize};

use crate::game::{Mode, PlayerId, SwingSample};

/// Lobby and mode control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMsg {
    Ready { id: PlayerId, ready: bool },
    Start,
    Mode { mode: Mode },
}

/// One player's swing for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickMsg {
    /// Tick boundary in milliseconds
    pub t: u64,
    pub id: PlayerId,
    pub swing: SwingSample,
}

/// Anything a peer may send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PeerMessage {
    Control(ControlMsg),
    Tick(TickMsg),
}

impl PeerMessage {
    pub fn decode(payload: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(payload).map_err(ProtocolError::Decode)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

impl From<ControlMsg> for PeerMessage {
    fn from(msg: ControlMsg) -> Self {
        Self::Control(msg)
    }
}

impl From<TickMsg> for PeerMessage {
    fn from(msg: TickMsg) -> Self {
        Self::Tick(msg)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed peer message: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode peer message: {0}")]
    Encode(#[source] serde_json::Error),
}
