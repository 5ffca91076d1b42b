//! JSON bodies returned by every node endpoint

use serde::{Deserialize, Serialize};

use crate::campaign::BattleOutcome;
use crate::core::types::{Faction, LocationId, LocationKind};

/// Common response envelope: `{success, message}` plus endpoint fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_army: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_resources: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faction: Option<Faction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<LocationId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub army_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_attack_move: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub captured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battle: Option<BattleOutcome>,
}

impl NodeResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Expected "try later" answer; not an error
    pub fn on_cooldown(message: impl Into<String>, seconds: u64) -> Self {
        Self {
            cooldown: Some(true),
            cooldown_seconds: Some(seconds),
            ..Self::failure(message)
        }
    }

    pub fn with_army(mut self, army: u32) -> Self {
        self.current_army = Some(army);
        self
    }

    pub fn with_resources(mut self, resources: u32) -> Self {
        self.current_resources = Some(resources);
        self
    }

    pub fn with_faction(mut self, faction: Faction) -> Self {
        self.faction = Some(faction);
        self
    }

    pub fn with_path(mut self, path: Vec<LocationId>) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_army_size(mut self, army_size: u32) -> Self {
        self.army_size = Some(army_size);
        self
    }

    pub fn with_amount(mut self, amount: u32) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_attack_move(mut self, is_attack_move: bool) -> Self {
        self.is_attack_move = Some(is_attack_move);
        self
    }

    pub fn with_cooldown(mut self, cooldown: bool) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn with_battle(mut self, outcome: BattleOutcome) -> Self {
        self.battle = Some(outcome);
        self
    }

    pub fn captured(mut self) -> Self {
        self.captured = true;
        self
    }

    /// Whether the receiving node took the payload (delivered or captured)
    pub fn accepted(&self) -> bool {
        self.success || self.captured
    }
}

/// Hop counters of one node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCounts {
    pub in_transit: u64,
    pub delivered: u64,
    pub lost: u64,
}

/// Body of `GET /`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationStatus {
    pub location_id: LocationId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: LocationKind,
    pub faction: Faction,
    pub connections: Vec<LocationId>,
    pub resources: u32,
    pub army: u32,
    /// Seconds until the location's throttled action is available again
    pub resource_cooldown: Option<u64>,
    #[serde(default)]
    pub transfers: TransferCounts,
}
