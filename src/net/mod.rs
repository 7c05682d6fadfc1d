//! Peer transport seam and wire protocol

pub mod channel;
pub mod protocol;

pub use channel::{
    join_with_retry, ChannelEvent, DataChannel, HubChannel, LocalHub, OfflineChannel,
    TransportError,
};
pub use protocol::{ControlMsg, PeerMessage, ProtocolError, TickMsg};
