//! LocationStore - durable per-node state records
//!
//! Holds one `LocationState` per location id, optionally mirrored to a JSON
//! file that is rewritten after every successful mutation. Updates are
//! all-or-nothing: the closure works on a copy that is only committed when it
//! returns `Ok` and the result still satisfies the location invariants.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::campaign::{LocationState, WorldGraph};
use crate::core::error::{Result, WarError};
use crate::core::types::{LocationId, LocationKind};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    locations: BTreeMap<LocationId, LocationState>,
}

/// Keyed record store owned by one node
#[derive(Debug)]
pub struct LocationStore {
    records: Mutex<AHashMap<LocationId, LocationState>>,
    /// Config defaults and kinds, in config order
    defaults: Vec<(LocationId, LocationKind, LocationState)>,
    path: Option<PathBuf>,
}

impl LocationStore {
    /// Store seeded from config, never written to disk
    pub fn in_memory(graph: &WorldGraph) -> Self {
        let defaults = defaults_of(graph);
        let records = seed(&defaults);
        Self {
            records: Mutex::new(records),
            defaults,
            path: None,
        }
    }

    /// Store backed by a JSON file
    ///
    /// Existing records are loaded; locations missing from the file start
    /// from their config defaults. The file is written back immediately so it
    /// always reflects the full world.
    pub fn open(path: impl Into<PathBuf>, graph: &WorldGraph) -> Result<Self> {
        let path = path.into();
        let defaults = defaults_of(graph);
        let mut records = seed(&defaults);

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let file: StoreFile = serde_json::from_str(&content)?;
            for (id, state) in file.locations {
                match records.get_mut(&id) {
                    Some(record) => *record = state,
                    None => tracing::warn!("Ignoring stored record for unknown location {}", id),
                }
            }
            tracing::info!("Loaded location state from {}", path.display());
        }

        let store = Self {
            records: Mutex::new(records),
            defaults,
            path: Some(path),
        };
        {
            let records = store.lock();
            store.persist(&records)?;
        }
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current record of a location
    pub fn get(&self, id: &LocationId) -> Result<LocationState> {
        self.lock()
            .get(id)
            .copied()
            .ok_or_else(|| WarError::UnknownLocation(id.clone()))
    }

    /// Atomic read-modify-write of one record
    pub fn update<R>(
        &self,
        id: &LocationId,
        f: impl FnOnce(&mut LocationState) -> Result<R>,
    ) -> Result<R> {
        let kind = self.kind_of(id)?;
        let mut records = self.lock();
        let current = *records
            .get(id)
            .ok_or_else(|| WarError::UnknownLocation(id.clone()))?;

        let mut next = current;
        let result = f(&mut next)?;
        next.check(kind).map_err(|reason| WarError::Invariant {
            location: id.clone(),
            reason,
        })?;

        if next != current {
            records.insert(id.clone(), next);
            if let Err(e) = self.persist(&records) {
                records.insert(id.clone(), current);
                return Err(e);
            }
        }
        Ok(result)
    }

    /// Reinitialize every record to its config default
    pub fn reset(&self) -> Result<()> {
        let mut records = self.lock();
        *records = seed(&self.defaults);
        self.persist(&records)?;
        tracing::info!("Location state reset to initial values");
        Ok(())
    }

    /// All records in config order
    pub fn snapshot(&self) -> Vec<(LocationId, LocationState)> {
        let records = self.lock();
        self.defaults
            .iter()
            .filter_map(|(id, _, _)| records.get(id).map(|state| (id.clone(), *state)))
            .collect()
    }

    fn kind_of(&self, id: &LocationId) -> Result<LocationKind> {
        self.defaults
            .iter()
            .find(|(known, _, _)| known == id)
            .map(|(_, kind, _)| *kind)
            .ok_or_else(|| WarError::UnknownLocation(id.clone()))
    }

    fn lock(&self) -> MutexGuard<'_, AHashMap<LocationId, LocationState>> {
        // A panic while holding the guard cannot leave a half-written record:
        // updates commit a fully built copy.
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, records: &AHashMap<LocationId, LocationState>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let file = StoreFile {
            locations: records.iter().map(|(id, state)| (id.clone(), *state)).collect(),
        };
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&file)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn defaults_of(graph: &WorldGraph) -> Vec<(LocationId, LocationKind, LocationState)> {
    graph
        .locations()
        .map(|location| (location.id.clone(), location.kind, location.initial_state()))
        .collect()
}

fn seed(
    defaults: &[(LocationId, LocationKind, LocationState)],
) -> AHashMap<LocationId, LocationState> {
    defaults
        .iter()
        .map(|(id, _, state)| (id.clone(), *state))
        .collect()
}
