//! Moving armies and resources between nodes

pub mod courier;
pub mod envelope;
pub mod local;
pub mod shutdown;
pub mod transport;

pub use courier::{Courier, TransferPhase, TransferStats};
pub use envelope::{ArmyEnvelope, PayloadKind, ResourceEnvelope, TransferEnvelope};
pub use local::LocalTransport;
pub use shutdown::{Shutdown, ShutdownSignal};
pub use transport::{HttpTransport, PeerTransport};
