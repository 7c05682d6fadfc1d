//! Time utilities for the tick loop

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Process start time for uptime tracking
static PROCESS_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize process start time (call once at startup)
pub fn init_server_time() {
    PROCESS_START.get_or_init(Instant::now);
}

/// Get uptime in seconds
pub fn uptime_secs() -> u64 {
    PROCESS_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 60; // 60 ticks per second

/// Delta time for physics (in seconds) at the given tick rate
pub fn tick_delta(tick_rate: u32) -> f32 {
    1.0 / tick_rate.max(1) as f32
}

/// Duration of one tick period
pub fn tick_period(tick_rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / tick_rate.max(1) as u64)
}

/// Identifies one tick period.
///
/// Internally this is the period index since the Unix epoch. On the wire a
/// tick travels as the millisecond of its boundary, rounded up so that
/// `from_millis(key.boundary_millis(rate), rate) == Some(key)` holds for any
/// rate below 1000.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TickKey(u64);

impl TickKey {
    pub const fn new(index: u64) -> Self {
        Self(index)
    }

    /// Key of the period that contains `millis`, or `None` if the
    /// millisecond value is too large to map
    pub fn from_millis(millis: u64, tick_rate: u32) -> Option<Self> {
        millis
            .checked_mul(tick_rate.max(1) as u64)
            .map(|scaled| Self(scaled / 1000))
    }

    pub fn index(self) -> u64 {
        self.0
    }

    /// Millisecond boundary of this period as carried on the wire
    pub fn boundary_millis(self, tick_rate: u32) -> u64 {
        (self.0 * 1000).div_ceil(tick_rate.max(1) as u64)
    }

    /// The key one period older (saturates at zero)
    pub fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for TickKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
