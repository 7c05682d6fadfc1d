//! Tennis scoring: points, games, sets and match
//!
//! `ScoreBoard::score_point` is a pure state transition. It reports what
//! happened as a list of `ScoreEvent`s; turning those into banners or
//! sounds is the render side's job.

use serde::Serialize;

use super::Team;

/// Display values for raw point counts 0..=3
pub const POINT_LABELS: [u8; 4] = [0, 15, 30, 40];
pub const GAMES_PER_SET: u8 = 6;
pub const TIEBREAK_POINTS: u8 = 7;
pub const SETS_TO_WIN: u8 = 2;

/// Whether the match is still being played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum MatchPhase {
    InProgress,
    /// Terminal; no further points are scored
    Finished { winner: Team },
}

/// What a single point changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScoreEvent {
    PointWon { team: Team },
    DeuceReached,
    Advantage { team: Team },
    GameWon { team: Team, games: [u8; 2] },
    TiebreakStarted,
    SetWon { team: Team, games: [u8; 2], sets: [u8; 2] },
    MatchWon { team: Team, sets: [u8; 2] },
    /// The match was already decided; nothing changed
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreBoard {
    /// Raw point counts; can exceed 3 during deuce play
    pub points: [u8; 2],
    pub games: [u8; 2],
    pub sets: [u8; 2],
    pub deuce: bool,
    pub advantage: Option<Team>,
    pub in_tiebreak: bool,
    pub tiebreak: [u8; 2],
    /// Index into the roster of the player serving
    pub serving: usize,
    pub serving_in_tiebreak: usize,
    pub phase: MatchPhase,
}

impl Default for ScoreBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self {
            points: [0, 0],
            games: [0, 0],
            sets: [0, 0],
            deuce: false,
            advantage: None,
            in_tiebreak: false,
            tiebreak: [0, 0],
            serving: 0,
            serving_in_tiebreak: 0,
            phase: MatchPhase::InProgress,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, MatchPhase::Finished { .. })
    }

    /// Displayed point value (0/15/30/40) for a team
    pub fn point_label(&self, team: Team) -> u8 {
        POINT_LABELS[usize::from(self.points[team.index()].min(3))]
    }

    /// Roster index of whoever serves the next point
    pub fn current_server(&self) -> usize {
        if self.in_tiebreak {
            self.serving_in_tiebreak
        } else {
            self.serving
        }
    }

    /// Award a point to `team`. `roster_len` drives the serve rotation.
    pub fn score_point(&mut self, team: Team, roster_len: usize) -> Vec<ScoreEvent> {
        if self.is_finished() {
            return vec![ScoreEvent::Ignored];
        }

        let mut events = vec![ScoreEvent::PointWon { team }];
        if self.in_tiebreak {
            self.score_tiebreak_point(team, roster_len, &mut events);
        } else {
            self.score_game_point(team, &mut events);
        }

        if !self.in_tiebreak && roster_len > 0 {
            self.serving = (self.serving + 1) % roster_len;
        }
        events
    }

    fn score_tiebreak_point(&mut self, team: Team, roster_len: usize, events: &mut Vec<ScoreEvent>) {
        let (me, them) = (team.index(), team.other().index());
        self.tiebreak[me] = self.tiebreak[me].saturating_add(1);

        if self.tiebreak[me] >= TIEBREAK_POINTS && self.tiebreak[me].saturating_sub(self.tiebreak[them]) >= 2 {
            self.games[me] += 1;
            let games = self.games;
            self.in_tiebreak = false;
            self.tiebreak = [0, 0];
            self.points = [0, 0];
            self.win_set(team, games, events);
        } else if roster_len > 0 && (u16::from(self.tiebreak[0]) + u16::from(self.tiebreak[1])) % 2 == 0 {
            self.serving_in_tiebreak = (self.serving_in_tiebreak + 1) % roster_len;
        }
    }

    fn score_game_point(&mut self, team: Team, events: &mut Vec<ScoreEvent>) {
        let (me, them) = (team.index(), team.other().index());
        self.points[me] += 1;
        let (mine, theirs) = (self.points[me], self.points[them]);

        if self.deuce {
            if mine >= 4 && mine >= theirs + 2 {
                self.win_game(team, events);
            } else if mine == theirs + 1 {
                self.deuce = false;
                self.advantage = Some(team);
                events.push(ScoreEvent::Advantage { team });
            }
            // otherwise still level: remain in deuce
        } else if self.advantage == Some(team) {
            self.win_game(team, events);
        } else if self.advantage.is_some() {
            // Back to level; keep raw counts small for long deuce games
            self.points = [3, 3];
            self.advantage = None;
            self.deuce = true;
            events.push(ScoreEvent::DeuceReached);
        } else if mine >= 4 && theirs < 3 {
            self.win_game(team, events);
        } else if mine >= 3 && theirs >= 3 {
            self.deuce = true;
            events.push(ScoreEvent::DeuceReached);
        }
    }

    fn win_game(&mut self, team: Team, events: &mut Vec<ScoreEvent>) {
        let (me, them) = (team.index(), team.other().index());
        self.games[me] += 1;
        self.points = [0, 0];
        self.deuce = false;
        self.advantage = None;
        let games = self.games;
        events.push(ScoreEvent::GameWon { team, games });

        if games[me] == GAMES_PER_SET && games[them] == GAMES_PER_SET {
            self.in_tiebreak = true;
            self.tiebreak = [0, 0];
            self.serving_in_tiebreak = self.serving;
            events.push(ScoreEvent::TiebreakStarted);
        } else if games[me] >= GAMES_PER_SET && games[me] - games[them] >= 2 {
            self.win_set(team, games, events);
        }
    }

    fn win_set(&mut self, team: Team, games: [u8; 2], events: &mut Vec<ScoreEvent>) {
        let me = team.index();
        self.sets[me] += 1;
        self.games = [0, 0];
        let sets = self.sets;
        events.push(ScoreEvent::SetWon { team, games, sets });

        if sets[me] >= SETS_TO_WIN {
            self.phase = MatchPhase::Finished { winner: team };
            events.push(ScoreEvent::MatchWon { team, sets });
        }
    }
}
