pub mod battle;
pub mod location;
pub mod map;
pub mod route;

pub use battle::{resolve_battle, BattleOutcome, BattleResult};
pub use location::{Location, LocationState};
pub use map::{Economy, WorldGraph};
pub use route::{path_cost, FactionSnapshot, PathPlanner, PathPolicy};
