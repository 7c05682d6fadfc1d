//! Simulation core: swing extraction, tick mailbox, physics, scoring

pub mod engine;
pub mod mailbox;
pub mod physics;
pub mod render;
pub mod scheduler;
pub mod scoring;
pub mod session;
pub mod swing;

pub use engine::{RulesEngine, SimError, TickReport};
pub use mailbox::{Completeness, InputMailbox};
pub use physics::{BallState, Effect, PhysicsSystem, Racket};
pub use render::{RenderBridge, RenderFrame, RenderSink};
pub use scheduler::{SchedulerCommand, SchedulerHandle, TickScheduler};
pub use scoring::{MatchPhase, ScoreBoard, ScoreEvent};
pub use session::{AppPhase, MatchSession};
pub use swing::{PoseFrame, PoseSource, SharedPose, SwingExtractor, SwingSample};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque player identity assigned by the transport
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One of the two sides of the net
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    One,
    Two,
}

impl Team {
    /// Teams alternate by roster position
    pub fn for_roster_index(index: usize) -> Self {
        if index % 2 == 0 {
            Self::One
        } else {
            Self::Two
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }

    /// Human numbering used in callouts
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }
}

/// Court configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Singles,
    #[default]
    Doubles,
}

impl Mode {
    /// Roster size needed before the lobby can start
    pub fn required_players(self) -> usize {
        match self {
            Self::Singles => 2,
            Self::Doubles => 4,
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "singles" => Ok(Self::Singles),
            "doubles" => Ok(Self::Doubles),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}
