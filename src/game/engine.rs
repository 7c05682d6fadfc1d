//! Physics & rules engine: one deterministic step per completed tick

use tracing::{debug, info, warn};

use crate::util::time::{tick_delta, TickKey};

use super::mailbox::TickInputs;
use super::physics::{CourtStats, Effect, PhysicsSystem};
use super::scoring::ScoreEvent;
use super::session::{server_racket, AppPhase, MatchSession};

/// A tick that could not be simulated
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("tick {tick} produced a non-finite ball state")]
    NonFinite { tick: TickKey },
}

/// What one simulated tick produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: TickKey,
    /// False when the tick was consumed without moving the ball
    pub advanced: bool,
    pub effects: Vec<Effect>,
    pub score_events: Vec<ScoreEvent>,
}

impl TickReport {
    fn idle(tick: TickKey) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }
}

pub struct RulesEngine;

impl RulesEngine {
    /// Advance the session by one tick.
    ///
    /// The step runs on scratch copies of the ball and scoreboard and only
    /// commits when it succeeds, so a failed tick leaves the last good state.
    pub fn simulate(
        session: &mut MatchSession,
        tick: TickKey,
        inputs: &TickInputs,
    ) -> Result<TickReport, SimError> {
        if session.phase() != AppPhase::Playing || session.score.is_finished() {
            return Ok(TickReport::idle(tick));
        }

        let mode = session.mode();
        let stats = CourtStats::for_mode(mode);
        let dt = tick_delta(session.config().tick_rate);

        let mut ball = session.ball.clone();
        let mut score = session.score.clone();

        let outcome = PhysicsSystem::step(&mut ball, inputs, &session.rackets, &stats, dt);
        if !ball.is_finite() {
            return Err(SimError::NonFinite { tick });
        }

        let mut score_events = Vec::new();
        if let Some(team) = outcome.scored {
            score_events = score.score_point(team, session.roster().len());
            let server = server_racket(session.roster(), &session.rackets, &score);
            PhysicsSystem::serve(&mut ball, server, mode);
            log_score_events(&score_events);
        }

        session.ball = ball;
        session.score = score;

        debug!(tick = %tick, effects = outcome.effects.len(), "Tick simulated");
        Ok(TickReport {
            tick,
            advanced: true,
            effects: outcome.effects,
            score_events,
        })
    }
}

fn log_score_events(events: &[ScoreEvent]) {
    for event in events {
        match event {
            ScoreEvent::GameWon { team, games } => {
                info!(team = team.number(), games = ?games, "Game won");
            }
            ScoreEvent::TiebreakStarted => info!("Tiebreak started"),
            ScoreEvent::SetWon { team, games, sets } => {
                info!(team = team.number(), games = ?games, sets = ?sets, "Set won");
            }
            ScoreEvent::MatchWon { team, sets } => {
                info!(team = team.number(), sets = ?sets, "Match won");
            }
            ScoreEvent::Ignored => warn!("Point scored after match end"),
            _ => {}
        }
    }
}
