pub mod config;
pub mod error;
pub mod types;

pub use config::NodeConfig;
pub use error::{ErrorKind, Result, WarError};
pub use types::{Faction, LocationId, LocationKind, TransferId};
