//! Per-tick input mailbox
//!
//! Collects one swing sample per player for each tick and gates simulation
//! until a tick has every expected input. Ticks are retired after they are
//! simulated or evicted; a retired key is never recreated, so late inputs
//! for it are dropped.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use tracing::debug;

use crate::util::time::TickKey;

use super::swing::SwingSample;
use super::PlayerId;

/// Inputs recorded for one tick
pub type TickInputs = HashMap<PlayerId, SwingSample>;

/// How a tick is judged complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completeness {
    /// Every roster member has an input
    #[default]
    Roster,
    /// The number of distinct senders equals the roster size
    Count,
}

impl FromStr for Completeness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "roster" | "identity" => Ok(Self::Roster),
            "count" => Ok(Self::Count),
            other => Err(format!("unknown completeness mode: {other}")),
        }
    }
}

/// Result of recording an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// First input from this player for the tick
    Stored,
    /// Replaced an earlier input from the same player
    Overwritten,
    /// The tick was already retired; input dropped
    Late,
    /// The tick is too far ahead of the local clock; input dropped
    Early,
}

pub struct InputMailbox {
    ticks: BTreeMap<TickKey, TickInputs>,
    /// Highest retired key; this key and everything older is closed
    retired_through: Option<TickKey>,
    max_pending: usize,
}

impl InputMailbox {
    pub fn new(max_pending: usize) -> Self {
        Self {
            ticks: BTreeMap::new(),
            retired_through: None,
            max_pending: max_pending.max(1),
        }
    }

    fn is_retired(&self, tick: TickKey) -> bool {
        self.retired_through.is_some_and(|through| tick <= through)
    }

    fn retire_through(&mut self, tick: TickKey) {
        if self.retired_through.map_or(true, |through| tick > through) {
            self.retired_through = Some(tick);
        }
        // split_off keeps everything at or above the key in the returned map
        self.ticks = self.ticks.split_off(&tick.next());
    }

    /// Record `sample` for `player` at `tick`; last write wins
    pub fn record(&mut self, tick: TickKey, player: PlayerId, sample: SwingSample) -> Recorded {
        if self.is_retired(tick) {
            debug!(tick = %tick, player_id = %player, "Dropping input for retired tick");
            return Recorded::Late;
        }

        let outcome = match self.ticks.entry(tick).or_default().insert(player, sample) {
            Some(_) => Recorded::Overwritten,
            None => Recorded::Stored,
        };

        // Backpressure: keep at most max_pending open ticks
        while self.ticks.len() > self.max_pending {
            let Some(oldest) = self.ticks.keys().next().copied() else {
                break;
            };
            debug!(tick = %oldest, pending = self.ticks.len(), "Retiring oldest pending tick");
            self.retire_through(oldest);
        }

        if self.is_retired(tick) {
            Recorded::Late
        } else {
            outcome
        }
    }

    /// Ticks a peer input may run ahead of the local tick
    pub fn horizon(&self) -> u64 {
        self.max_pending.saturating_sub(1).max(1) as u64
    }

    /// Record a peer's input, refusing keys beyond the horizon past `now`.
    ///
    /// Far-future keys would otherwise hold pending slots until the local
    /// clock reaches them and push the current tick out as the oldest.
    pub fn record_peer(
        &mut self,
        now: TickKey,
        tick: TickKey,
        player: PlayerId,
        sample: SwingSample,
    ) -> Recorded {
        if tick.index() > now.index().saturating_add(self.horizon()) {
            debug!(tick = %tick, now = %now, player_id = %player, "Dropping input ahead of horizon");
            return Recorded::Early;
        }
        self.record(tick, player, sample)
    }

    /// Cardinality check: the tick has exactly `expected` distinct senders
    pub fn is_complete(&self, tick: TickKey, expected: usize) -> bool {
        self.ticks
            .get(&tick)
            .is_some_and(|inputs| inputs.len() == expected)
    }

    /// Identity check: every member of `roster` has an input for the tick
    pub fn is_complete_for(&self, tick: TickKey, roster: &[PlayerId]) -> bool {
        self.ticks
            .get(&tick)
            .is_some_and(|inputs| roster.iter().all(|id| inputs.contains_key(id)))
    }

    pub fn is_ready(&self, tick: TickKey, mode: Completeness, roster: &[PlayerId]) -> bool {
        match mode {
            Completeness::Roster => self.is_complete_for(tick, roster),
            Completeness::Count => self.is_complete(tick, roster.len()),
        }
    }

    /// Oldest-first keys of ticks that are ready to simulate
    pub fn ready_ticks(&self, mode: Completeness, roster: &[PlayerId]) -> Vec<TickKey> {
        self.ticks
            .keys()
            .copied()
            .filter(|tick| self.is_ready(*tick, mode, roster))
            .collect()
    }

    /// Remove and return a tick's inputs, retiring it and any older tick
    pub fn take(&mut self, tick: TickKey) -> Option<TickInputs> {
        if self.is_retired(tick) {
            return None;
        }
        let inputs = self.ticks.remove(&tick);
        self.retire_through(tick);
        inputs
    }

    /// Drop a tick without simulating it
    pub fn evict(&mut self, tick: TickKey) {
        if self.ticks.remove(&tick).is_some() {
            debug!(tick = %tick, "Evicted tick");
        }
        self.retire_through(tick);
    }

    /// Number of open ticks
    pub fn pending(&self) -> usize {
        self.ticks.len()
    }
}

impl Default for InputMailbox {
    fn default() -> Self {
        Self::new(8)
    }
}
