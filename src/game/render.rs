//! Render bridge: turns committed simulation state into draw frames
//!
//! The bridge never feeds back into the simulation. Banners fade by
//! evaluating their opacity from a start time and duration each frame.

use glam::Vec3;
use serde::Serialize;

use super::engine::TickReport;
use super::physics::{Effect, TrailPoint};
use super::scoring::{MatchPhase, ScoreBoard, ScoreEvent};
use super::session::{AppPhase, MatchSession};
use super::{PlayerId, Team};

pub const TEAM_COLORS: [u32; 2] = [0xFF5722, 0x2196F3];
pub const NEUTRAL_COLOR: u32 = 0xFFFFFF;
pub const BANNER_FADE_MS: u64 = 250;
/// Banner lifetime including both fades
pub const BANNER_LIFETIME_MS: u64 = 3000;
const SERVER_INDICATOR_HEIGHT: f32 = 1.2;

/// Consumer of finished frames (the 3D renderer lives behind this)
pub trait RenderSink: Send {
    fn draw(&mut self, frame: &RenderFrame);
}

/// A text callout shown over the court
#[derive(Debug, Clone, PartialEq)]
pub struct Banner {
    pub text: String,
    pub color: u32,
    pub started_at: u64,
    /// `None` keeps the banner up until the session ends
    pub lifetime_ms: Option<u64>,
}

impl Banner {
    fn timed(text: impl Into<String>, color: u32, now_ms: u64) -> Self {
        Self {
            text: text.into(),
            color,
            started_at: now_ms,
            lifetime_ms: Some(BANNER_LIFETIME_MS),
        }
    }

    /// Opacity at `now_ms` under the fade envelope
    pub fn opacity(&self, now_ms: u64) -> f32 {
        let age = now_ms.saturating_sub(self.started_at);
        let fade_in = (age as f32 / BANNER_FADE_MS as f32).min(1.0);
        match self.lifetime_ms {
            None => fade_in,
            Some(lifetime) => {
                let remaining = lifetime.saturating_sub(age);
                let fade_out = (remaining as f32 / BANNER_FADE_MS as f32).min(1.0);
                fade_in.min(fade_out)
            }
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.lifetime_ms
            .is_some_and(|lifetime| now_ms.saturating_sub(self.started_at) >= lifetime)
    }
}

/// Derives callouts from score events, latching repeated ones
#[derive(Debug, Default)]
pub struct Announcer {
    banners: Vec<Banner>,
    deuce_shown: bool,
    game_point_shown: bool,
}

impl Announcer {
    pub fn announce(&mut self, text: impl Into<String>, color: u32, now_ms: u64) {
        self.banners.push(Banner::timed(text, color, now_ms));
    }

    pub fn banners(&self) -> &[Banner] {
        &self.banners
    }

    pub fn on_score_events(&mut self, events: &[ScoreEvent], board: &ScoreBoard, now_ms: u64) {
        for event in events {
            match *event {
                ScoreEvent::PointWon { team } => {
                    self.announce(format!("Point for Team {}!", team.number()), team_color(team), now_ms);
                }
                ScoreEvent::GameWon { team, .. } => {
                    self.announce(format!("Game Team {}", team.number()), team_color(team), now_ms);
                }
                ScoreEvent::TiebreakStarted => self.announce("Tiebreak", NEUTRAL_COLOR, now_ms),
                ScoreEvent::SetWon { team, .. } => {
                    self.announce(format!("Set Team {}", team.number()), team_color(team), now_ms);
                }
                ScoreEvent::MatchWon { team, .. } => {
                    self.banners.push(Banner {
                        text: format!("Match Team {}!", team.number()),
                        color: team_color(team),
                        started_at: now_ms,
                        lifetime_ms: None,
                    });
                }
                ScoreEvent::DeuceReached | ScoreEvent::Advantage { .. } | ScoreEvent::Ignored => {}
            }
        }
        if events.iter().any(|e| matches!(e, ScoreEvent::PointWon { .. })) {
            self.check_point_situation(board, now_ms);
        }
    }

    fn check_point_situation(&mut self, board: &ScoreBoard, now_ms: u64) {
        if board.in_tiebreak || board.is_finished() {
            return;
        }
        if board.deuce {
            if !self.deuce_shown {
                self.deuce_shown = true;
                self.announce("Deuce", NEUTRAL_COLOR, now_ms);
            }
            return;
        }
        self.deuce_shown = false;

        if let Some(team) = board.advantage {
            self.announce(format!("Advantage Team {}", team.number()), team_color(team), now_ms);
            return;
        }

        for team in [Team::One, Team::Two] {
            let mine = board.point_label(team);
            let theirs = board.point_label(team.other());
            if (mine == 40 && theirs < 40) || (mine == 30 && theirs == 0) {
                if !self.game_point_shown {
                    self.game_point_shown = true;
                    self.announce(format!("Game Point Team {}", team.number()), team_color(team), now_ms);
                }
                return;
            }
        }
        self.game_point_shown = false;
    }

    fn prune(&mut self, now_ms: u64) {
        self.banners.retain(|b| !b.is_expired(now_ms));
    }
}

pub fn team_color(team: Team) -> u32 {
    TEAM_COLORS[team.index()]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RacketView {
    pub owner: PlayerId,
    pub team: Team,
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BannerView {
    pub text: String,
    pub color: u32,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreView {
    /// "15-30", "Deuce", "Ad Team 1" or tiebreak points
    pub points: String,
    pub games: [u8; 2],
    pub sets: [u8; 2],
    pub in_tiebreak: bool,
    pub winner: Option<Team>,
}

impl ScoreView {
    pub fn from_board(board: &ScoreBoard) -> Self {
        let points = if board.in_tiebreak {
            format!("{}-{}", board.tiebreak[0], board.tiebreak[1])
        } else if board.deuce {
            "Deuce".to_string()
        } else if let Some(team) = board.advantage {
            format!("Ad Team {}", team.number())
        } else {
            format!(
                "{}-{}",
                board.point_label(Team::One),
                board.point_label(Team::Two)
            )
        };
        let winner = match board.phase {
            MatchPhase::Finished { winner } => Some(winner),
            MatchPhase::InProgress => None,
        };
        Self {
            points,
            games: board.games,
            sets: board.sets,
            in_tiebreak: board.in_tiebreak,
            winner,
        }
    }
}

/// One frame of draw data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderFrame {
    pub tick: u64,
    pub playing: bool,
    pub ball: Vec3,
    pub trail: Vec<TrailPoint>,
    pub rackets: Vec<RacketView>,
    pub server_indicator: Option<Vec3>,
    pub score: ScoreView,
    pub effects: Vec<Effect>,
    pub banners: Vec<BannerView>,
    pub players: usize,
}

pub struct RenderBridge {
    sink: Box<dyn RenderSink>,
    announcer: Announcer,
}

impl RenderBridge {
    pub fn new(sink: Box<dyn RenderSink>) -> Self {
        Self {
            sink,
            announcer: Announcer::default(),
        }
    }

    pub fn announcer(&self) -> &Announcer {
        &self.announcer
    }

    pub fn on_game_start(&mut self, now_ms: u64) {
        self.announcer.announce("Game Start!", NEUTRAL_COLOR, now_ms);
    }

    /// Build the frame for a committed tick and hand it to the sink
    pub fn present(&mut self, session: &MatchSession, report: &TickReport, now_ms: u64) -> RenderFrame {
        self.announcer
            .on_score_events(&report.score_events, session.score(), now_ms);
        self.announcer.prune(now_ms);

        let frame = build_frame(session, report, &self.announcer, now_ms);
        self.sink.draw(&frame);
        frame
    }
}

fn build_frame(session: &MatchSession, report: &TickReport, announcer: &Announcer, now_ms: u64) -> RenderFrame {
    let mut rackets: Vec<RacketView> = session
        .rackets()
        .values()
        .map(|r| RacketView {
            owner: r.owner.clone(),
            team: r.team,
            position: r.position,
        })
        .collect();
    rackets.sort_by(|a, b| a.owner.cmp(&b.owner));

    let ball = session.ball();
    RenderFrame {
        tick: report.tick.index(),
        playing: session.phase() == AppPhase::Playing,
        ball: ball.position,
        trail: ball.trail.iter().copied().collect(),
        rackets,
        server_indicator: session
            .server_racket()
            .map(|r| r.position + Vec3::Y * SERVER_INDICATOR_HEIGHT),
        score: ScoreView::from_board(session.score()),
        effects: report.effects.clone(),
        banners: announcer
            .banners()
            .iter()
            .map(|b| BannerView {
                text: b.text.clone(),
                color: b.color,
                opacity: b.opacity(now_ms),
            })
            .collect(),
        players: session.roster().len(),
    }
}

/// Sink that logs a compact frame summary at trace level
#[derive(Debug, Default)]
pub struct TracingRenderer;

impl RenderSink for TracingRenderer {
    fn draw(&mut self, frame: &RenderFrame) {
        tracing::trace!(
            tick = frame.tick,
            ball = ?frame.ball,
            score = %frame.score.points,
            banners = frame.banners.len(),
            "Frame"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::util::time::TickKey;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<RenderFrame>>>);

    impl RenderSink for Recorder {
        fn draw(&mut self, frame: &RenderFrame) {
            self.0.lock().unwrap().push(frame.clone());
        }
    }

    fn texts(announcer: &Announcer) -> Vec<&str> {
        announcer.banners().iter().map(|b| b.text.as_str()).collect()
    }

    #[test]
    fn banner_fades_in_holds_and_fades_out() {
        let banner = Banner::timed("Deuce", NEUTRAL_COLOR, 1_000);
        assert_eq!(banner.opacity(1_000), 0.0);
        assert!((banner.opacity(1_125) - 0.5).abs() < 1e-6);
        assert_eq!(banner.opacity(2_000), 1.0);
        assert!((banner.opacity(3_875) - 0.5).abs() < 1e-6);
        assert_eq!(banner.opacity(4_000), 0.0);
        assert!(banner.is_expired(4_000));
        assert!(!banner.is_expired(3_999));
    }

    #[test]
    fn score_text_follows_board_state() {
        let mut board = ScoreBoard::new();
        board.points = [2, 1];
        assert_eq!(ScoreView::from_board(&board).points, "30-15");
        board.deuce = true;
        assert_eq!(ScoreView::from_board(&board).points, "Deuce");
        board.deuce = false;
        board.advantage = Some(Team::Two);
        assert_eq!(ScoreView::from_board(&board).points, "Ad Team 2");
        board.in_tiebreak = true;
        board.tiebreak = [4, 3];
        assert_eq!(ScoreView::from_board(&board).points, "4-3");
    }

    #[test]
    fn deuce_and_game_point_callouts_latch() {
        let mut announcer = Announcer::default();
        let mut board = ScoreBoard::new();

        for _ in 0..3 {
            let events = board.score_point(Team::One, 4);
            announcer.on_score_events(&events, &board, 0);
        }
        let shown: Vec<_> = texts(&announcer).into_iter().filter(|t| t.starts_with("Game Point")).collect();
        assert_eq!(shown, vec!["Game Point Team 1"], "30-0 and 40-0 announce once");

        for _ in 0..3 {
            let events = board.score_point(Team::Two, 4);
            announcer.on_score_events(&events, &board, 0);
        }
        let events = board.score_point(Team::Two, 4);
        announcer.on_score_events(&events, &board, 0);
        let events = board.score_point(Team::One, 4);
        announcer.on_score_events(&events, &board, 0);

        let deuces = texts(&announcer).iter().filter(|t| **t == "Deuce").count();
        assert_eq!(deuces, 2, "deuce is re-announced after an advantage");
        assert!(texts(&announcer).contains(&"Advantage Team 2"));
    }

    #[test]
    fn match_banner_never_expires() {
        let mut announcer = Announcer::default();
        let board = ScoreBoard::new();
        announcer.on_score_events(&[ScoreEvent::MatchWon { team: Team::One, sets: [2, 0] }], &board, 0);
        announcer.prune(1_000_000);
        assert_eq!(texts(&announcer), vec!["Match Team 1!"]);
    }

    #[test]
    fn present_draws_frame_with_server_indicator() {
        let recorder = Recorder::default();
        let mut bridge = RenderBridge::new(Box::new(recorder.clone()));
        let mut session = MatchSession::new("me".into(), SessionConfig::default());
        session.player_joined("b".into());
        session.start();
        bridge.on_game_start(0);

        let report = TickReport {
            tick: TickKey::new(5),
            ..TickReport::default()
        };
        let frame = bridge.present(&session, &report, 100);

        assert_eq!(recorder.0.lock().unwrap().len(), 1);
        assert_eq!(frame.tick, 5);
        assert!(frame.playing);
        assert_eq!(frame.rackets.len(), 2);
        assert_eq!(frame.server_indicator, Some(Vec3::new(-8.0, 1.7, 3.0)));
        assert_eq!(frame.banners[0].text, "Game Start!");
        assert!(serde_json::to_string(&frame).is_ok());
    }

    #[test]
    fn bridge_prunes_banners_as_frames_go_by() {
        let mut bridge = RenderBridge::new(Box::new(TracingRenderer));
        let session = MatchSession::new("me".into(), SessionConfig::default());
        bridge.on_game_start(0);

        let frame = bridge.present(&session, &TickReport::default(), 100);
        assert!(!frame.playing);
        assert_eq!(texts(bridge.announcer()), vec!["Game Start!"]);

        let frame = bridge.present(&session, &TickReport::default(), 10_000);
        assert!(frame.banners.is_empty());
        assert!(bridge.announcer().banners().is_empty());
    }
}
