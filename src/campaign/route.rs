//! Route planning across the campaign map
//!
//! Dijkstra over the location graph where the cost of entering a location
//! depends on who holds it right now. Ownership changes constantly, so routes
//! are never cached: every call plans against a fresh `FactionSnapshot`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use super::map::WorldGraph;
use crate::core::types::{Faction, LocationId};

/// Which weight function a route uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathPolicy {
    /// Resource convoys: enemy territory is impassable
    Logistics,
    /// Armies: enemy territory is passable but expensive
    Military,
}

impl PathPolicy {
    /// Cost of entering a location held by `holder`, `None` when impassable
    pub fn entry_cost(&self, traveling: Faction, holder: Faction) -> Option<u32> {
        if holder == traveling {
            return Some(1);
        }
        if holder.is_neutral() {
            return Some(2);
        }
        match self {
            Self::Logistics => None,
            Self::Military => Some(3),
        }
    }
}

/// Factions observed at one moment, keyed by location
///
/// A location missing from the snapshot could not be observed and is treated
/// as impassable.
#[derive(Debug, Clone, Default)]
pub struct FactionSnapshot {
    factions: AHashMap<LocationId, Faction>,
}

impl FactionSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: LocationId, faction: Faction) {
        self.factions.insert(id, faction);
    }

    pub fn get(&self, id: &LocationId) -> Option<Faction> {
        self.factions.get(id).copied()
    }
}

impl FromIterator<(LocationId, Faction)> for FactionSnapshot {
    fn from_iter<I: IntoIterator<Item = (LocationId, Faction)>>(iter: I) -> Self {
        Self {
            factions: iter.into_iter().collect(),
        }
    }
}

/// Entry in the open set
#[derive(Debug, Clone, PartialEq, Eq)]
struct Frontier {
    cost: u32,
    /// Discovery order; equal costs pop in the order they were pushed
    seq: usize,
    index: usize,
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shortest-path planner over a world graph
pub struct PathPlanner<'a> {
    graph: &'a WorldGraph,
}

impl<'a> PathPlanner<'a> {
    pub fn new(graph: &'a WorldGraph) -> Self {
        Self { graph }
    }

    /// Find the cheapest route from `from` to `to` for `traveling`
    ///
    /// The returned path starts with `from` and ends with `to`. Returns `None`
    /// if either end is unknown or the target cannot be reached under `policy`.
    pub fn find_path(
        &self,
        from: &LocationId,
        to: &LocationId,
        policy: PathPolicy,
        traveling: Faction,
        snapshot: &FactionSnapshot,
    ) -> Option<Vec<LocationId>> {
        let ids = self.graph.ids();
        let start = ids.iter().position(|id| id == from)?;
        let goal = ids.iter().position(|id| id == to)?;

        if start == goal {
            return Some(vec![from.clone()]);
        }

        let index_of: AHashMap<&LocationId, usize> =
            ids.iter().enumerate().map(|(i, id)| (id, i)).collect();

        let mut dist = vec![u32::MAX; ids.len()];
        let mut previous: Vec<Option<usize>> = vec![None; ids.len()];
        let mut settled = vec![false; ids.len()];
        let mut open_set = BinaryHeap::new();
        let mut seq = 0;

        dist[start] = 0;
        open_set.push(Frontier {
            cost: 0,
            seq,
            index: start,
        });

        while let Some(current) = open_set.pop() {
            if settled[current.index] {
                continue;
            }
            settled[current.index] = true;

            if current.index == goal {
                return Some(reconstruct_path(ids, &previous, goal));
            }

            for neighbor in self.graph.neighbors(&ids[current.index]) {
                let Some(&next) = index_of.get(neighbor) else {
                    continue;
                };
                if settled[next] {
                    continue;
                }

                let Some(holder) = snapshot.get(neighbor) else {
                    continue;
                };
                let Some(weight) = policy.entry_cost(traveling, holder) else {
                    continue;
                };

                let candidate = current.cost + weight;
                if candidate < dist[next] {
                    dist[next] = candidate;
                    previous[next] = Some(current.index);
                    seq += 1;
                    open_set.push(Frontier {
                        cost: candidate,
                        seq,
                        index: next,
                    });
                }
            }
        }

        None
    }
}

fn reconstruct_path(
    ids: &[LocationId],
    previous: &[Option<usize>],
    goal: usize,
) -> Vec<LocationId> {
    let mut path = vec![ids[goal].clone()];
    let mut current = goal;
    while let Some(prev) = previous[current] {
        path.push(ids[prev].clone());
        current = prev;
    }
    path.reverse();
    path
}

/// Total entry cost of a path, `None` if any step is impassable
pub fn path_cost(
    path: &[LocationId],
    policy: PathPolicy,
    traveling: Faction,
    snapshot: &FactionSnapshot,
) -> Option<u32> {
    path.iter().skip(1).try_fold(0u32, |total, id| {
        let holder = snapshot.get(id)?;
        Some(total + policy.entry_cost(traveling, holder)?)
    })
}
