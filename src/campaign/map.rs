//! Campaign map - static world topology
//!
//! The graph of locations every node shares. Adjacency and economic constants
//! never change at runtime; who controls a location does, and lives in the
//! per-node `LocationStore` instead.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use super::location::Location;
use crate::core::error::{Result, WarError};
use crate::core::types::{Faction, LocationId, LocationKind};

/// Per-kind economic constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Economy {
    /// Resources gained by one manual collection at a capital
    pub capital_generation: u32,
    /// Resources gained by one passive generation tick at a village
    pub village_generation: u32,
    /// Resource cost of one army unit
    pub army_cost: u32,
}

impl Default for Economy {
    fn default() -> Self {
        Self {
            capital_generation: 20,
            village_generation: 10,
            army_cost: 30,
        }
    }
}

impl Economy {
    pub fn generation(&self, kind: LocationKind) -> u32 {
        match kind {
            LocationKind::Capital => self.capital_generation,
            LocationKind::Village => self.village_generation,
        }
    }
}

/// Static topology of the world
#[derive(Debug, Clone)]
pub struct WorldGraph {
    locations: AHashMap<LocationId, Location>,
    /// Config order, used wherever iteration has to be deterministic
    order: Vec<LocationId>,
    economy: Economy,
}

impl WorldGraph {
    /// Build and validate a graph from location configs
    pub fn new(locations: Vec<Location>, economy: Economy) -> Result<Self> {
        let mut order = Vec::with_capacity(locations.len());
        let mut by_id = AHashMap::with_capacity(locations.len());
        for location in locations {
            order.push(location.id.clone());
            if by_id.insert(location.id.clone(), location).is_some() {
                return Err(WarError::Config(format!(
                    "duplicate location id {}",
                    order.last().map(|id| id.as_str()).unwrap_or_default()
                )));
            }
        }

        let graph = Self {
            locations: by_id,
            order,
            economy,
        };
        graph.validate()?;
        Ok(graph)
    }

    /// The two-kingdom, six-village map the game ships with
    pub fn standard() -> Self {
        // (id, home faction, connections, port); capitals start with 100 resources and 1 army
        let capitals: [(&str, Faction, &[&str], u16); 2] = [
            ("southern_capital", Faction::Southern, &["village_1", "village_3"], 5001),
            ("northern_capital", Faction::Northern, &["village_2", "village_6"], 5002),
        ];
        // (id, connections, initial army, port); villages start neutral with 50 resources
        let villages: [(&str, &[&str], u32, u16); 6] = [
            ("village_1", &["southern_capital", "village_2", "village_4"], 2, 5003),
            ("village_2", &["northern_capital", "village_1", "village_5"], 3, 5004),
            ("village_3", &["southern_capital", "village_5", "village_6"], 2, 5005),
            ("village_4", &["village_1", "village_5"], 1, 5006),
            ("village_5", &["village_2", "village_3", "village_4", "village_6"], 4, 5007),
            ("village_6", &["northern_capital", "village_3", "village_5"], 2, 5008),
        ];

        let table = capitals
            .into_iter()
            .map(|(id, faction, connections, port)| {
                (id, LocationKind::Capital, faction, connections, 100, 1, port)
            })
            .chain(villages.into_iter().map(|(id, connections, army, port)| {
                (id, LocationKind::Village, Faction::Neutral, connections, 50, army, port)
            }));

        let mut locations = AHashMap::with_capacity(8);
        let mut order = Vec::with_capacity(8);
        for (id, kind, faction, connections, resources, army, port) in table {
            let location = Location {
                id: id.into(),
                name: display_name(id),
                kind,
                faction,
                connections: connections.iter().map(|c| (*c).into()).collect(),
                initial_resources: resources,
                initial_army: army,
                host: "127.0.0.1".into(),
                port,
            };
            order.push(location.id.clone());
            locations.insert(location.id.clone(), location);
        }

        Self {
            locations,
            order,
            economy: Economy::default(),
        }
    }

    /// Check structural consistency
    pub fn validate(&self) -> Result<()> {
        let mut ports = AHashSet::new();

        for id in &self.order {
            let location = self.get(id)?;

            if location.is_capital() && location.faction.is_neutral() {
                return Err(WarError::Config(format!("capital {} has no home faction", id)));
            }

            if !ports.insert((location.host.as_str(), location.port)) {
                return Err(WarError::Config(format!(
                    "{} reuses address {}:{}",
                    id, location.host, location.port
                )));
            }

            for neighbor in &location.connections {
                if neighbor == id {
                    return Err(WarError::Config(format!("{} is connected to itself", id)));
                }
                let other = self
                    .locations
                    .get(neighbor)
                    .ok_or_else(|| {
                        WarError::Config(format!("{} connects to unknown {}", id, neighbor))
                    })?;
                // Edges are undirected; both ends must list each other
                if !other.is_connected_to(id) {
                    return Err(WarError::Config(format!(
                        "edge {} -> {} has no reverse edge",
                        id, neighbor
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn get(&self, id: &LocationId) -> Result<&Location> {
        self.locations
            .get(id)
            .ok_or_else(|| WarError::UnknownLocation(id.clone()))
    }

    pub fn contains(&self, id: &LocationId) -> bool {
        self.locations.contains_key(id)
    }

    /// All locations in config order
    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.order.iter().filter_map(|id| self.locations.get(id))
    }

    pub fn ids(&self) -> &[LocationId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Neighbors of a location in config order; empty for unknown ids
    pub fn neighbors(&self, id: &LocationId) -> &[LocationId] {
        self.locations
            .get(id)
            .map(|location| location.connections.as_slice())
            .unwrap_or(&[])
    }

    pub fn economy(&self) -> &Economy {
        &self.economy
    }

    /// The capital whose home faction is `faction`
    pub fn capital_of(&self, faction: Faction) -> Option<&Location> {
        self.locations()
            .find(|location| location.is_capital() && location.faction == faction)
    }

    /// First capital, other than `from`, whose home faction is not `faction`
    pub fn enemy_capital(&self, from: &LocationId, faction: Faction) -> Option<&Location> {
        self.locations().find(|location| {
            location.is_capital() && &location.id != from && location.faction != faction
        })
    }
}

/// `village_1` -> `Village 1`
fn display_name(id: &str) -> String {
    id.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
