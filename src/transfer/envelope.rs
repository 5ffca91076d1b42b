//! Wire messages carried from hop to hop
//!
//! `remaining_path` always lists the hops still to visit *after* the node
//! receiving the envelope; a receiver consumes its head to pick the next hop
//! and forwards the tail.

use serde::{Deserialize, Serialize};

use crate::core::types::{Faction, LocationId, TransferId};

/// Body of `POST /receive_army`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmyEnvelope {
    pub army_size: u32,
    pub faction: Faction,
    pub source_location: LocationId,
    #[serde(default)]
    pub remaining_path: Vec<LocationId>,
    #[serde(default)]
    pub is_attack_move: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<LocationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<TransferId>,
}

/// Body of `POST /receive_resources`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEnvelope {
    pub resources: u32,
    pub faction: Faction,
    pub source_location: LocationId,
    #[serde(default)]
    pub remaining_path: Vec<LocationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<LocationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<TransferId>,
}

/// What a transfer carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Army,
    Resources,
}

/// Either kind of in-flight payload
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEnvelope {
    Army(ArmyEnvelope),
    Resources(ResourceEnvelope),
}

impl TransferEnvelope {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Army(_) => PayloadKind::Army,
            Self::Resources(_) => PayloadKind::Resources,
        }
    }

    pub fn amount(&self) -> u32 {
        match self {
            Self::Army(army) => army.army_size,
            Self::Resources(cargo) => cargo.resources,
        }
    }
}

/// Split a remaining path into the next hop and the tail after it
pub fn next_hop(remaining: &[LocationId]) -> Option<(&LocationId, &[LocationId])> {
    remaining.split_first()
}
