use thiserror::Error;

use crate::core::types::{Faction, LocationId, LocationKind};

/// Broad classes of failure; decides the HTTP status of a rejected call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller asked for something the rules forbid; nothing was mutated
    PolicyViolation,
    /// No path exists under the current faction topology
    Unreachable,
    /// An outbound hop call failed
    TransitFailure,
    /// Anything unexpected
    Internal,
}

#[derive(Error, Debug)]
pub enum WarError {
    #[error("Only {required}s can {operation}")]
    WrongLocationKind {
        operation: &'static str,
        required: LocationKind,
    },

    #[error("Not enough resources. Need {need}, have {have}")]
    InsufficientResources { need: u32, have: u32 },

    #[error("No army to move")]
    NoArmy,

    #[error("Cannot move to {target}. Not connected to {from}")]
    NotConnected { from: LocationId, target: LocationId },

    #[error("{0} locations cannot do that")]
    WrongFaction(Faction),

    #[error("Unknown location: {0}")]
    UnknownLocation(LocationId),

    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    #[error("No valid path from {from} to {to}")]
    NoPath { from: LocationId, to: LocationId },

    #[error("Transfer to {target} failed: {reason}")]
    Transit { target: LocationId, reason: String },

    #[error("Node is shutting down")]
    ShuttingDown,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("State invariant violated at {location}: {reason}")]
    Invariant { location: LocationId, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("World load error: {0}")]
    Load(#[from] crate::world::loader::LoadError),
}

impl WarError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WrongLocationKind { .. }
            | Self::InsufficientResources { .. }
            | Self::NoArmy
            | Self::NotConnected { .. }
            | Self::WrongFaction(_)
            | Self::UnknownLocation(_)
            | Self::InvalidTransfer(_) => ErrorKind::PolicyViolation,
            Self::NoPath { .. } => ErrorKind::Unreachable,
            Self::Transit { .. } => ErrorKind::TransitFailure,
            Self::ShuttingDown
            | Self::Config(_)
            | Self::Invariant { .. }
            | Self::IoError(_)
            | Self::SerdeError(_)
            | Self::Load(_) => ErrorKind::Internal,
        }
    }

    /// Wrong actor for the operation (as opposed to a bad request)
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::WrongLocationKind { .. } | Self::WrongFaction(_))
    }
}

pub type Result<T> = std::result::Result<T, WarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(WarError::NoArmy.kind(), ErrorKind::PolicyViolation);
        let no_path = WarError::NoPath {
            from: "a".into(),
            to: "b".into(),
        };
        assert_eq!(no_path.kind(), ErrorKind::Unreachable);
        assert_eq!(WarError::ShuttingDown.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_wrong_kind_message() {
        let err = WarError::WrongLocationKind {
            operation: "create armies",
            required: LocationKind::Capital,
        };
        assert_eq!(err.to_string(), "Only capitals can create armies");
        assert!(err.is_forbidden());
    }
}
