//! Data-channel seam between the tick loop and the peer transport
//!
//! The scheduler only sees [`DataChannel`] for broadcasts and a stream of
//! [`ChannelEvent`]s for presence and inbound payloads. [`LocalHub`] wires
//! several sessions together in-process; [`OfflineChannel`] is used when
//! joining a real transport fails.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::game::PlayerId;

/// Capacity of each member's inbound event queue
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Presence change or payload delivered by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Joined(PlayerId),
    Left(PlayerId),
    /// Participant metadata changed; the id is unchanged
    Updated(PlayerId),
    Message { from: PlayerId, payload: String },
}

/// Broadcast side of a joined data channel
pub trait DataChannel: Send {
    fn local_id(&self) -> &PlayerId;

    /// Send `payload` to every other participant
    fn send(&self, payload: String) -> Result<(), TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("participant {0} already joined")]
    AlreadyJoined(PlayerId),
    #[error("channel closed")]
    Closed,
    #[error("join failed after {attempts} attempts: {reason}")]
    JoinFailed { attempts: u32, reason: String },
}

type Members = DashMap<PlayerId, mpsc::Sender<ChannelEvent>>;

/// In-process broadcast hub
#[derive(Clone, Default)]
pub struct LocalHub {
    members: Arc<Members>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join under a fresh random id
    pub fn join(&self) -> (HubChannel, mpsc::Receiver<ChannelEvent>) {
        loop {
            let id = PlayerId::new(Uuid::new_v4().to_string());
            if let Ok(joined) = self.join_as(id) {
                return joined;
            }
        }
    }

    /// Join under a chosen id. Existing members are announced to the newcomer
    /// and the newcomer to them.
    pub fn join_as(
        &self,
        id: PlayerId,
    ) -> Result<(HubChannel, mpsc::Receiver<ChannelEvent>), TransportError> {
        if self.members.contains_key(&id) {
            return Err(TransportError::AlreadyJoined(id));
        }
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        let existing: Vec<PlayerId> = self.members.iter().map(|m| m.key().clone()).collect();
        for peer in &existing {
            let _ = tx.try_send(ChannelEvent::Joined(peer.clone()));
        }
        self.broadcast(&id, ChannelEvent::Joined(id.clone()));
        self.members.insert(id.clone(), tx);

        info!(player_id = %id, members = self.members.len(), "Joined local hub");
        Ok((
            HubChannel {
                hub: self.clone(),
                id,
            },
            rx,
        ))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn leave(&self, id: &PlayerId) {
        if self.members.remove(id).is_some() {
            self.broadcast(id, ChannelEvent::Left(id.clone()));
            info!(player_id = %id, members = self.members.len(), "Left local hub");
        }
    }

    /// Deliver to everyone except `from`. Full queues drop the event.
    fn broadcast(&self, from: &PlayerId, event: ChannelEvent) {
        for member in self.members.iter() {
            if member.key() == from {
                continue;
            }
            match member.value().try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(player_id = %member.key(), "Event queue full, dropping");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(player_id = %member.key(), "Event queue closed");
                }
            }
        }
    }
}

/// A member's handle on a [`LocalHub`]; leaving happens on drop
pub struct HubChannel {
    hub: LocalHub,
    id: PlayerId,
}

impl HubChannel {
    /// Report a participant metadata change to the other members
    pub fn update(&self) {
        self.hub
            .broadcast(&self.id, ChannelEvent::Updated(self.id.clone()));
    }
}

impl DataChannel for HubChannel {
    fn local_id(&self) -> &PlayerId {
        &self.id
    }

    fn send(&self, payload: String) -> Result<(), TransportError> {
        if !self.hub.members.contains_key(&self.id) {
            return Err(TransportError::Closed);
        }
        self.hub.broadcast(
            &self.id,
            ChannelEvent::Message {
                from: self.id.clone(),
                payload,
            },
        );
        Ok(())
    }
}

impl Drop for HubChannel {
    fn drop(&mut self) {
        self.hub.leave(&self.id);
    }
}

/// Local-only play: broadcasts go nowhere
#[derive(Debug, Clone)]
pub struct OfflineChannel {
    id: PlayerId,
}

impl OfflineChannel {
    pub fn new(id: PlayerId) -> Self {
        Self { id }
    }
}

impl DataChannel for OfflineChannel {
    fn local_id(&self) -> &PlayerId {
        &self.id
    }

    fn send(&self, _payload: String) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Try `connect` up to `attempts` times, doubling `backoff` between tries.
///
/// `connect` receives the 1-based attempt number.
pub async fn join_with_retry<T, F, Fut>(
    mut connect: F,
    attempts: u32,
    backoff: Duration,
) -> Result<T, TransportError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let attempts = attempts.max(1);
    let mut delay = backoff;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match connect(attempt).await {
            Ok(joined) => {
                if attempt > 1 {
                    info!(attempt, "Data channel joined after retry");
                }
                return Ok(joined);
            }
            Err(e) => {
                warn!(attempt, max_attempts = attempts, error = %e, "Data channel join failed");
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }
    }

    error!(attempts, error = %last_error, "Giving up on data channel");
    Err(TransportError::JoinFailed {
        attempts,
        reason: last_error,
    })
}
