//! Runtime configuration for the server process.
//!
//! Gameplay constants live in `shared`; this module only holds the knobs the
//! binary exposes on its command line.

use clap::ValueEnum;
use shared::{MAX_PLAYERS, TICK_MILLIS};
use std::time::Duration;

/// How startup bots are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AllianceMode {
    /// Every bot gets a team of its own, like a human would.
    #[default]
    Solo,
    /// All startup bots share one team.
    SharedTeam,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotPolicy {
    pub allow_bots: bool,
    pub max_bots: usize,
    pub alliance_mode: AllianceMode,
    pub startup_bots: usize,
    pub startup_profile: String,
}

impl Default for BotPolicy {
    fn default() -> Self {
        Self {
            allow_bots: true,
            max_bots: 4,
            alliance_mode: AllianceMode::Solo,
            startup_bots: 0,
            startup_profile: "idle".to_string(),
        }
    }
}

impl BotPolicy {
    /// Bot slots actually available under this policy.
    pub fn bot_limit(&self) -> usize {
        if self.allow_bots {
            self.max_bots.min(MAX_PLAYERS)
        } else {
            0
        }
    }
}

/// Limits applied to every inbound connection before anything reaches the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct IngressLimits {
    pub max_frame_bytes: usize,
    pub bucket_capacity: f64,
    pub refill_per_second: f64,
    /// Consecutive invalid frames before the connection is dropped.
    pub invalid_threshold: u32,
    pub connection_burst: usize,
    pub connection_window: Duration,
}

impl Default for IngressLimits {
    fn default() -> Self {
        Self {
            max_frame_bytes: 4096,
            bucket_capacity: 120.0,
            refill_per_second: 120.0,
            invalid_threshold: 10,
            connection_burst: 5,
            connection_window: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub tick_duration: Duration,
    pub max_players: usize,
    pub map_name: String,
    pub seed: u64,
    pub client_timeout: Duration,
    /// Outbound packets buffered per connection before new ones are dropped.
    pub outbound_queue: usize,
    pub bots: BotPolicy,
    pub ingress: IngressLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            tick_duration: Duration::from_millis(TICK_MILLIS),
            max_players: MAX_PLAYERS,
            map_name: "training-ground".to_string(),
            seed: 0,
            client_timeout: Duration::from_secs(10),
            outbound_queue: 256,
            bots: BotPolicy::default(),
            ingress: IngressLimits::default(),
        }
    }
}
