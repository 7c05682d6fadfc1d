//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::mailbox::Completeness;
use crate::game::swing::AngleSmoothing;
use crate::util::time::SIMULATION_TPS;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Relay binding address
    pub relay_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Relay: disconnect clients silent for longer than this
    pub idle_timeout: Duration,
    /// Relay: how often the idle sweep runs
    pub reap_interval: Duration,
    /// Relay: inbound messages per second allowed per client
    pub relay_msg_rate: u32,

    /// Session tuning handed to the simulation core
    pub session: SessionConfig,
}

/// Simulation settings for one match session
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Pending ticks kept in the mailbox before the oldest is retired
    pub max_pending_ticks: usize,
    /// How the mailbox decides a tick has every input
    pub completeness: Completeness,
    /// How the swing extractor smooths the angle component
    pub angle_smoothing: AngleSmoothing,
    /// Data channel join attempts before falling back to offline play
    pub join_attempts: u32,
    /// Backoff before the second join attempt, doubled afterwards
    pub join_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_rate: SIMULATION_TPS,
            max_pending_ticks: 8,
            completeness: Completeness::Roster,
            angle_smoothing: AngleSmoothing::Linear,
            join_attempts: 5,
            join_backoff: Duration::from_millis(250),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_addr: SocketAddr::from(([0, 0, 0, 0], 8082)),
            log_level: "info".to_string(),
            idle_timeout: Duration::from_secs(30),
            reap_interval: Duration::from_secs(10),
            relay_msg_rate: 120,
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT wins over RELAY_ADDR so hosted environments can inject it
        let relay_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("RELAY_ADDR").unwrap_or_else(|_| "0.0.0.0:8082".to_string())
        };

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            tick_rate: parse_or("TICK_RATE", defaults.tick_rate)?,
            max_pending_ticks: parse_or("MAX_PENDING_TICKS", defaults.max_pending_ticks)?,
            completeness: parse_or("COMPLETENESS", defaults.completeness)?,
            angle_smoothing: parse_or("ANGLE_SMOOTHING", defaults.angle_smoothing)?,
            join_attempts: parse_or("JOIN_ATTEMPTS", defaults.join_attempts)?,
            join_backoff: Duration::from_millis(parse_or("JOIN_BACKOFF_MS", 250u64)?),
        };

        if session.tick_rate == 0 || session.tick_rate >= 1000 {
            return Err(ConfigError::Invalid("TICK_RATE"));
        }

        Ok(Self {
            relay_addr: relay_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            idle_timeout: Duration::from_secs(parse_or("IDLE_TIMEOUT_SECS", 30u64)?),
            reap_interval: Duration::from_secs(parse_or("REAP_INTERVAL_SECS", 10u64)?),
            relay_msg_rate: parse_or("RELAY_MSG_RATE", 120u32)?,

            session,
        })
    }
}

fn parse_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(var)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid relay address format")]
    InvalidAddress,
}
