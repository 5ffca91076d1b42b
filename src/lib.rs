//! War of Kingdoms - distributed territorial conquest
//!
//! Every location of the world runs as its own node, owning its resources,
//! army and faction. Armies and resources travel between nodes one hop at a
//! time; battles are resolved by the node being entered.

pub mod campaign;
pub mod core;
pub mod node;
pub mod transfer;
pub mod world;
