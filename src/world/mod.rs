//! World definition loading and per-node state storage

pub mod loader;
pub mod store;

pub use loader::{load_world, load_world_from_str, LoadError, LoadedWorld, WorldFile};
pub use store::LocationStore;
