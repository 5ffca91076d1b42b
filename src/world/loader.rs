//! Load the world definition from a TOML file
//!
//! One file describes the whole world: node timing, the economy and every
//! location. All nodes of a world are started from the same file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::campaign::{Economy, Location, WorldGraph};
use crate::core::config::NodeConfig;
use crate::core::error::WarError;

/// Errors that can occur when loading a world file
#[derive(Debug, Error)]
pub enum LoadError {
    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
    /// File parsed but describes an inconsistent world
    #[error("Invalid world: {0}")]
    Invalid(String),
    /// File I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// On-disk layout of a world file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldFile {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub economy: Economy,
    pub locations: Vec<Location>,
}

/// A parsed and validated world
#[derive(Debug, Clone)]
pub struct LoadedWorld {
    pub graph: WorldGraph,
    pub config: NodeConfig,
}

impl LoadedWorld {
    /// The built-in map with default timing
    pub fn standard() -> Self {
        Self {
            graph: WorldGraph::standard(),
            config: NodeConfig::default(),
        }
    }
}

/// Load a world from a TOML string
pub fn load_world_from_str(content: &str) -> Result<LoadedWorld, LoadError> {
    let file: WorldFile = toml::from_str(content)?;
    file.node.validate().map_err(LoadError::Invalid)?;

    let graph = WorldGraph::new(file.locations, file.economy).map_err(|e| match e {
        WarError::Config(reason) => LoadError::Invalid(reason),
        other => LoadError::Invalid(other.to_string()),
    })?;

    if graph.is_empty() {
        return Err(LoadError::Invalid("world has no locations".into()));
    }

    Ok(LoadedWorld {
        graph,
        config: file.node,
    })
}

/// Load a world from a TOML file on disk
pub fn load_world(path: &Path) -> Result<LoadedWorld, LoadError> {
    let content = std::fs::read_to_string(path)?;
    load_world_from_str(&content)
}
