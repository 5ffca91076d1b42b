//! A single location node: its rules, throttles and HTTP surface

pub mod api;
pub mod cooldown;
pub mod response;
pub mod service;

pub use api::{router, serve, ApiError};
pub use cooldown::CooldownGuard;
pub use response::{LocationStatus, NodeResponse, TransferCounts};
pub use service::{MoveArmyRequest, NodeService, ResetRequest};
