//! Node timing configuration with documented constants
//!
//! All pacing numbers are collected here with explanations of their purpose
//! and how they interact with each other.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing configuration shared by every location node
///
/// These values set the pace of the game. Every node of one world should run
/// with the same values, otherwise transfers arrive at uneven speeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    // === TRANSFERS ===
    /// Artificial delay before each hop of an army or resource transfer (seconds)
    ///
    /// A three-hop all-out attack therefore takes about three times this long
    /// to reach the enemy capital.
    pub transit_delay_secs: u64,

    /// Timeout for one outbound hop call (seconds)
    ///
    /// A hop that does not answer within this window is treated as lost.
    pub request_timeout_secs: u64,

    // === COOLDOWNS ===
    /// Wait between two manual resource collections at a capital (seconds)
    pub collect_cooldown_secs: u64,

    /// Wait between two send-to-capital transfers from one village (seconds)
    pub send_cooldown_secs: u64,

    // === ECONOMY ===
    /// Interval of passive village resource generation (seconds)
    ///
    /// Villages cannot collect manually; this timer is their only income.
    pub passive_interval_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            transit_delay_secs: 5,
            request_timeout_secs: 10,
            collect_cooldown_secs: 5,
            send_cooldown_secs: 5,
            passive_interval_secs: 15,
        }
    }
}

impl NodeConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transit_delay(&self) -> Duration {
        Duration::from_secs(self.transit_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn collect_cooldown(&self) -> Duration {
        Duration::from_secs(self.collect_cooldown_secs)
    }

    pub fn send_cooldown(&self) -> Duration {
        Duration::from_secs(self.send_cooldown_secs)
    }

    pub fn passive_interval(&self) -> Duration {
        Duration::from_secs(self.passive_interval_secs)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<(), String> {
        // A zero interval would spin the generation task
        if self.passive_interval_secs == 0 {
            return Err("passive_interval_secs must be positive".into());
        }

        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be positive".into());
        }

        // The next hop forwards after its own delay, so the caller's timeout
        // only has to cover the synchronous part of the receive handler.
        if self.request_timeout_secs < self.transit_delay_secs / 2 {
            return Err(format!(
                "request_timeout_secs ({}) is too short for transit_delay_secs ({})",
                self.request_timeout_secs, self.transit_delay_secs
            ));
        }

        Ok(())
    }
}
