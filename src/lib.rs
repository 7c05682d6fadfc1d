//! Tennis for Four - tick-synchronized simulation core
//!
//! - `game`: swing extraction, input mailbox, physics, scoring, tick loop
//! - `net`: peer wire protocol and the data-channel seam
//! - `relay`: the standalone WebSocket fan-out server

pub mod config;
pub mod game;
pub mod net;
pub mod relay;
pub mod util;
