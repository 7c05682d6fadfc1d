//! Standalone WebSocket relay: pure fan-out between browser clients

pub mod handler;
pub mod protocol;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ws::Message, State},
    http::Method,
    response::Json,
    routing::get,
    Router,
};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::interval;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::util::time::{unix_millis, uptime_secs};

use self::handler::ws_handler;
use self::protocol::{ClientId, RelayOutbound};

/// Per-client outbound queue depth
const CLIENT_QUEUE_CAPACITY: usize = 256;

/// A connected socket as seen by the fan-out
pub struct RelayClient {
    tx: mpsc::Sender<Message>,
    last_seen: AtomicU64,
}

/// Shared relay state
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<Config>,
    clients: Arc<DashMap<ClientId, RelayClient>>,
    next_id: Arc<AtomicU64>,
}

impl RelayState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            clients: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Add a client under the next id; returns its outbound queue
    pub fn register(&self) -> (ClientId, mpsc::Receiver<Message>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        self.clients.insert(
            id,
            RelayClient {
                tx,
                last_seen: AtomicU64::new(unix_millis()),
            },
        );
        (id, rx)
    }

    /// Register a new socket, greet it and announce it to everyone else
    pub fn on_connect(&self) -> (ClientId, mpsc::Receiver<Message>) {
        let (id, rx) = self.register();
        let total_players = self.client_count();
        self.send_to(
            id,
            &RelayOutbound::Welcome {
                player_id: id,
                total_players,
                message: format!("Welcome Player {}!", id + 1),
            },
        );
        self.broadcast_others(
            id,
            &RelayOutbound::PlayerJoin {
                player_id: id,
                total_players,
                timestamp: unix_millis(),
            },
        );
        info!(player_id = id, total_players, "Relay client connected");
        (id, rx)
    }

    /// Drop a finished socket and tell the remaining clients.
    /// A reaped client is already gone from the map; the leave still goes out.
    pub fn on_disconnect(&self, id: ClientId) {
        self.unregister(id);
        let total_players = self.client_count();
        self.broadcast_all(&RelayOutbound::PlayerLeave {
            player_id: id,
            total_players,
            timestamp: unix_millis(),
        });
        info!(player_id = id, total_players, "Relay client disconnected");
    }

    pub fn unregister(&self, id: ClientId) -> bool {
        self.clients.remove(&id).is_some()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Record activity from a client
    pub fn touch(&self, id: ClientId, now_ms: u64) {
        if let Some(client) = self.clients.get(&id) {
            client.last_seen.store(now_ms, Ordering::Relaxed);
        }
    }

    pub fn send_to(&self, id: ClientId, msg: &RelayOutbound) {
        let Some(text) = encode(msg) else {
            return;
        };
        if let Some(client) = self.clients.get(&id) {
            enqueue(id, &client.tx, Message::Text(text));
        }
    }

    pub fn broadcast_others(&self, from: ClientId, msg: &RelayOutbound) {
        self.broadcast_where(msg, |id| id != from);
    }

    pub fn broadcast_all(&self, msg: &RelayOutbound) {
        self.broadcast_where(msg, |_| true);
    }

    fn broadcast_where(&self, msg: &RelayOutbound, include: impl Fn(ClientId) -> bool) {
        let Some(text) = encode(msg) else {
            return;
        };
        for client in self.clients.iter() {
            if include(*client.key()) {
                enqueue(*client.key(), &client.tx, Message::Text(text.clone()));
            }
        }
    }

    /// Close and remove clients silent for longer than the idle timeout
    pub fn reap_idle(&self, now_ms: u64) -> Vec<ClientId> {
        let timeout_ms = self.config.idle_timeout.as_millis() as u64;
        let stale: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|c| now_ms.saturating_sub(c.last_seen.load(Ordering::Relaxed)) > timeout_ms)
            .map(|c| *c.key())
            .collect();

        for id in &stale {
            if let Some((_, client)) = self.clients.remove(id) {
                let _ = client.tx.try_send(Message::Close(None));
                info!(player_id = id, "Reaped idle relay client");
            }
        }
        stale
    }

    /// Ask every writer to close its socket
    pub fn close_all(&self) {
        for client in self.clients.iter() {
            let _ = client.tx.try_send(Message::Close(None));
        }
        info!(clients = self.clients.len(), "Closing all relay clients");
    }
}

fn encode(msg: &RelayOutbound) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(error = %e, "Failed to encode relay message");
            None
        }
    }
}

fn enqueue(id: ClientId, tx: &mpsc::Sender<Message>, msg: Message) {
    match tx.try_send(msg) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(player_id = id, "Relay client lagging, dropping message");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(player_id = id, "Relay client queue closed");
        }
    }
}

/// Periodic idle sweep; runs until the process exits
pub async fn run_reaper(state: RelayState) {
    let mut sweep = interval(state.config.reap_interval);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        sweep.tick().await;
        let reaped = state.reap_idle(unix_millis());
        if !reaped.is_empty() {
            debug!(reaped = reaped.len(), remaining = state.client_count(), "Idle sweep");
        }
    }
}

/// Build the relay router
pub fn build_router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(10)))
                .layer(cors),
        )
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    connected_clients: usize,
}

async fn health_handler(State(state): State<RelayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        connected_clients: state.client_count(),
    })
}
