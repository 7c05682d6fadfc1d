//! Match session: the single owner of all mutable simulation state

use std::collections::HashMap;

use tracing::info;

use crate::config::SessionConfig;
use crate::util::time::TickKey;

use super::mailbox::{InputMailbox, Recorded, TickInputs};
use super::physics::{racket_layout, BallState, PhysicsSystem, Racket};
use super::scoring::ScoreBoard;
use super::swing::{Handedness, SwingExtractor, SwingSample};
use super::{Mode, PlayerId, Team};

/// Top-level client phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppPhase {
    /// Gathering players and ready flags
    Lobby,
    /// Rallies are being simulated
    Playing,
}

/// Lobby readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyStatus {
    Waiting { joined: usize, required: usize },
    AwaitingReady,
    AllReady,
}

/// Everything the tick loop mutates, owned in one place
pub struct MatchSession {
    config: SessionConfig,
    local_id: PlayerId,
    /// Sorted by id, local player included. Every peer derives the same
    /// teams, racket slots and serve order from it.
    roster: Vec<PlayerId>,
    ready: HashMap<PlayerId, bool>,
    phase: AppPhase,
    mode: Mode,
    pub(crate) ball: BallState,
    pub(crate) rackets: HashMap<PlayerId, Racket>,
    pub(crate) score: ScoreBoard,
    mailbox: InputMailbox,
    extractor: SwingExtractor,
}

impl MatchSession {
    pub fn new(local_id: PlayerId, config: SessionConfig) -> Self {
        let ready = HashMap::from([(local_id.clone(), false)]);
        Self {
            config,
            roster: vec![local_id.clone()],
            local_id,
            ready,
            phase: AppPhase::Lobby,
            mode: Mode::default(),
            ball: BallState::default(),
            rackets: HashMap::new(),
            score: ScoreBoard::new(),
            mailbox: InputMailbox::new(config.max_pending_ticks),
            extractor: SwingExtractor::new(Handedness::Right, config.angle_smoothing),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn local_id(&self) -> &PlayerId {
        &self.local_id
    }

    pub fn roster(&self) -> &[PlayerId] {
        &self.roster
    }

    pub fn phase(&self) -> AppPhase {
        self.phase
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn ball(&self) -> &BallState {
        &self.ball
    }

    pub fn rackets(&self) -> &HashMap<PlayerId, Racket> {
        &self.rackets
    }

    pub fn score(&self) -> &ScoreBoard {
        &self.score
    }

    pub fn mailbox(&self) -> &InputMailbox {
        &self.mailbox
    }

    pub(crate) fn mailbox_mut(&mut self) -> &mut InputMailbox {
        &mut self.mailbox
    }

    pub(crate) fn extractor_mut(&mut self) -> &mut SwingExtractor {
        &mut self.extractor
    }

    /// Connected peers plus self
    pub fn expected_count(&self) -> usize {
        self.roster.len()
    }

    pub fn team_of(&self, id: &PlayerId) -> Option<Team> {
        self.roster
            .iter()
            .position(|p| p == id)
            .map(Team::for_roster_index)
    }

    pub fn is_ready(&self, id: &PlayerId) -> bool {
        self.ready.get(id).copied().unwrap_or(false)
    }

    /// Racket of whoever serves the next point
    pub fn server_racket(&self) -> Option<&Racket> {
        server_racket(&self.roster, &self.rackets, &self.score)
    }

    pub fn record_input(&mut self, tick: TickKey, player: PlayerId, sample: SwingSample) -> Recorded {
        self.mailbox.record(tick, player, sample)
    }

    /// Record a remote input; `now` is the local tick
    pub fn record_peer_input(
        &mut self,
        now: TickKey,
        tick: TickKey,
        player: PlayerId,
        sample: SwingSample,
    ) -> Recorded {
        self.mailbox.record_peer(now, tick, player, sample)
    }

    /// Take a tick's inputs if it is ready under the configured rule
    pub fn take_ready(&mut self, tick: TickKey) -> Option<TickInputs> {
        if self
            .mailbox
            .is_ready(tick, self.config.completeness, &self.roster)
        {
            self.mailbox.take(tick)
        } else {
            None
        }
    }

    pub fn ready_ticks(&self) -> Vec<TickKey> {
        self.mailbox
            .ready_ticks(self.config.completeness, &self.roster)
    }

    /// Add a peer. Returns false for self or an already known id.
    pub fn player_joined(&mut self, id: PlayerId) -> bool {
        let Err(index) = self.roster.binary_search(&id) else {
            return false;
        };
        self.roster.insert(index, id.clone());
        self.ready.insert(id.clone(), false);

        // Keep the serve on the same player
        if self.score.serving >= index {
            self.score.serving += 1;
        }
        if self.score.serving_in_tiebreak >= index {
            self.score.serving_in_tiebreak += 1;
        }

        // Slots follow roster order, so a join can shift everyone after it
        if self.phase == AppPhase::Playing {
            self.rebuild_rackets();
        }
        info!(player_id = %id, roster_size = self.roster.len(), "Player joined session");
        true
    }

    /// Remove a peer and everything keyed by it
    pub fn player_left(&mut self, id: &PlayerId) -> bool {
        if id == &self.local_id {
            return false;
        }
        let Some(index) = self.roster.iter().position(|p| p == id) else {
            return false;
        };
        self.roster.remove(index);
        self.ready.remove(id);

        let len = self.roster.len();
        self.score.serving = shift_after_removal(self.score.serving, index, len);
        self.score.serving_in_tiebreak = shift_after_removal(self.score.serving_in_tiebreak, index, len);

        if self.phase == AppPhase::Playing {
            self.rebuild_rackets();
        } else {
            self.rackets.remove(id);
        }
        info!(player_id = %id, roster_size = len, "Player left session");
        true
    }

    pub fn set_ready(&mut self, id: &PlayerId, ready: bool) {
        if let Some(flag) = self.ready.get_mut(id) {
            *flag = ready;
        }
    }

    pub fn lobby_status(&self) -> LobbyStatus {
        let required = self.mode.required_players();
        let joined = self.roster.len();
        if joined < required {
            LobbyStatus::Waiting { joined, required }
        } else if self.roster.iter().all(|id| self.is_ready(id)) {
            LobbyStatus::AllReady
        } else {
            LobbyStatus::AwaitingReady
        }
    }

    /// Whether the local client should announce the start
    pub fn should_auto_start(&self) -> bool {
        self.phase == AppPhase::Lobby && self.lobby_status() == LobbyStatus::AllReady
    }

    /// Leave the lobby and serve the first ball. Returns false if already playing.
    pub fn start(&mut self) -> bool {
        if self.phase == AppPhase::Playing {
            return false;
        }
        self.phase = AppPhase::Playing;
        self.score = ScoreBoard::new();
        self.rebuild_rackets();
        let server = self.server_racket().cloned();
        PhysicsSystem::serve(&mut self.ball, server.as_ref(), self.mode);
        info!(mode = ?self.mode, players = self.roster.len(), "Game started");
        true
    }

    /// Switch singles/doubles, replacing the racket layout in one step
    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        if self.phase == AppPhase::Playing {
            self.rebuild_rackets();
        }
        info!(mode = ?mode, "Mode changed");
    }

    fn rebuild_rackets(&mut self) {
        let rackets = self
            .roster
            .iter()
            .enumerate()
            .filter_map(|(index, id)| {
                racket_for_slot(self.mode, index, id).map(|racket| (id.clone(), racket))
            })
            .collect();
        self.rackets = rackets;
    }
}

/// Keep a serve index on the same player after `removed` leaves the roster
fn shift_after_removal(serving: usize, removed: usize, len: usize) -> usize {
    let serving = if serving > removed { serving - 1 } else { serving };
    if serving >= len {
        0
    } else {
        serving
    }
}

fn racket_for_slot(mode: Mode, index: usize, id: &PlayerId) -> Option<Racket> {
    racket_layout(mode).get(index).map(|&position| Racket {
        owner: id.clone(),
        team: Team::for_roster_index(index),
        position,
    })
}

pub(crate) fn server_racket<'a>(
    roster: &[PlayerId],
    rackets: &'a HashMap<PlayerId, Racket>,
    score: &ScoreBoard,
) -> Option<&'a Racket> {
    roster
        .get(score.current_server())
        .and_then(|id| rackets.get(id))
}
