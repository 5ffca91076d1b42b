//! Battle resolution for campaign layer
//!
//! When an army arrives at a location held by another faction, this resolves
//! the fight. The model is strength-only: no morale, no terrain, no dice.

use serde::{Deserialize, Serialize};

use crate::core::types::Faction;

/// Outcome of an army arriving at a location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleOutcome {
    /// Same faction on both sides; armies combine
    Reinforcement,
    /// Attacker outnumbered the garrison and takes the location
    AttackerVictory,
    /// Garrison outnumbered the attacker and holds
    DefenderVictory,
    /// Equal strength; both sides are wiped out and the defender keeps the empty location
    Stalemate,
}

impl BattleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reinforcement => "reinforcement",
            Self::AttackerVictory => "attacker_victory",
            Self::DefenderVictory => "defender_victory",
            Self::Stalemate => "stalemate",
        }
    }
}

impl std::fmt::Display for BattleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Results of a battle resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BattleResult {
    pub outcome: BattleOutcome,
    /// Army left standing at the location
    pub remaining_army: u32,
    /// Faction holding the location afterwards
    pub owner: Faction,
}

/// Resolve an army arriving at a defended location
///
/// Pure and deterministic. The caller persists `remaining_army` and `owner`
/// onto the defender's state and decides whether a victorious army moves on.
pub fn resolve_battle(
    attack_army: u32,
    attack_faction: Faction,
    defend_army: u32,
    defend_faction: Faction,
) -> BattleResult {
    if attack_faction == defend_faction {
        return BattleResult {
            outcome: BattleOutcome::Reinforcement,
            remaining_army: attack_army.saturating_add(defend_army),
            owner: attack_faction,
        };
    }

    if attack_army > defend_army {
        BattleResult {
            outcome: BattleOutcome::AttackerVictory,
            remaining_army: attack_army - defend_army,
            owner: attack_faction,
        }
    } else if defend_army > attack_army {
        BattleResult {
            outcome: BattleOutcome::DefenderVictory,
            remaining_army: defend_army - attack_army,
            owner: defend_faction,
        }
    } else {
        BattleResult {
            outcome: BattleOutcome::Stalemate,
            remaining_army: 0,
            owner: defend_faction,
        }
    }
}
