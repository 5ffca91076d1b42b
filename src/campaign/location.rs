//! Location - a node on the campaign map
//!
//! `Location` is the static config of a node; `LocationState` is the mutable
//! record the node owns at runtime.

use serde::{Deserialize, Serialize};

use crate::core::types::{Faction, LocationId, LocationKind};

fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Static description of a location, immutable at runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: LocationKind,
    /// Starting faction; the home faction for capitals, `neutral` for most villages
    pub faction: Faction,
    pub connections: Vec<LocationId>,
    pub initial_resources: u32,
    pub initial_army: u32,
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

impl Location {
    pub fn is_capital(&self) -> bool {
        self.kind == LocationKind::Capital
    }

    pub fn is_connected_to(&self, other: &LocationId) -> bool {
        self.connections.contains(other)
    }

    /// Base URL the node listens on
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Fresh state used at world init and on reset
    pub fn initial_state(&self) -> LocationState {
        LocationState {
            resources: self.initial_resources,
            army: self.initial_army,
            faction: self.faction,
        }
    }
}

/// Mutable per-location record
///
/// Counts are unsigned, so the non-negativity invariant holds by construction;
/// arithmetic on them saturates instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationState {
    pub resources: u32,
    pub army: u32,
    pub faction: Faction,
}

impl LocationState {
    pub fn add_resources(&mut self, amount: u32) -> u32 {
        self.resources = self.resources.saturating_add(amount);
        self.resources
    }

    /// Remove up to `amount`, returns how much was actually removed
    pub fn remove_resources(&mut self, amount: u32) -> u32 {
        let removed = amount.min(self.resources);
        self.resources -= removed;
        removed
    }

    /// Take the whole garrison out of the location
    pub fn take_army(&mut self) -> u32 {
        std::mem::take(&mut self.army)
    }

    pub fn add_army(&mut self, amount: u32) -> u32 {
        self.army = self.army.saturating_add(amount);
        self.army
    }

    /// Check the faction invariant for a location of the given kind
    pub fn check(&self, kind: LocationKind) -> Result<(), String> {
        if kind == LocationKind::Capital && self.faction.is_neutral() {
            return Err("a capital can never be neutral".into());
        }
        Ok(())
    }
}
