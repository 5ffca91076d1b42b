//! In-process transport
//!
//! Routes peer calls straight to `NodeService`s living in the same process.
//! Used by the single-process world runner and by tests; a location can be
//! marked offline to simulate an unreachable node.

use std::sync::{Arc, RwLock, Weak};

use ahash::{AHashMap, AHashSet};
use futures::future::BoxFuture;
use futures::FutureExt;

use super::envelope::TransferEnvelope;
use super::transport::PeerTransport;
use crate::core::error::{Result, WarError};
use crate::core::types::LocationId;
use crate::node::response::{LocationStatus, NodeResponse};
use crate::node::NodeService;

#[derive(Default)]
pub struct LocalTransport {
    nodes: RwLock<AHashMap<LocationId, Weak<NodeService>>>,
    offline: RwLock<AHashSet<LocationId>>,
}

impl LocalTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, node: &Arc<NodeService>) {
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        nodes.insert(node.id().clone(), Arc::downgrade(node));
    }

    /// Make calls to `id` fail as if its process were down
    pub fn set_offline(&self, id: &LocationId, offline: bool) {
        let mut set = self.offline.write().unwrap_or_else(|e| e.into_inner());
        if offline {
            set.insert(id.clone());
        } else {
            set.remove(id);
        }
    }

    fn lookup(&self, target: &LocationId) -> Result<Arc<NodeService>> {
        let unreachable = |reason: &str| WarError::Transit {
            target: target.clone(),
            reason: reason.to_string(),
        };

        let offline = self.offline.read().unwrap_or_else(|e| e.into_inner());
        if offline.contains(target) {
            return Err(unreachable("connection refused"));
        }
        drop(offline);

        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        nodes
            .get(target)
            .and_then(Weak::upgrade)
            .ok_or_else(|| unreachable("no such node"))
    }
}

/// A handler error on the far side is what an HTTP client would see as a
/// non-success status
fn remote_failure(target: &LocationId, error: WarError) -> WarError {
    match error {
        WarError::Transit { .. } => error,
        other => WarError::Transit {
            target: target.clone(),
            reason: other.to_string(),
        },
    }
}

impl PeerTransport for LocalTransport {
    fn deliver<'a>(
        &'a self,
        target: &'a LocationId,
        envelope: &'a TransferEnvelope,
    ) -> BoxFuture<'a, Result<NodeResponse>> {
        async move {
            let node = self.lookup(target)?;
            let reply = match envelope {
                TransferEnvelope::Army(army) => node.receive_army(army.clone()).await,
                TransferEnvelope::Resources(cargo) => node.receive_resources(cargo.clone()).await,
            };
            reply.map_err(|e| remote_failure(target, e))
        }
        .boxed()
    }

    fn status<'a>(&'a self, target: &'a LocationId) -> BoxFuture<'a, Result<LocationStatus>> {
        async move {
            let node = self.lookup(target)?;
            node.status().await.map_err(|e| remote_failure(target, e))
        }
        .boxed()
    }

    fn reset<'a>(&'a self, target: &'a LocationId) -> BoxFuture<'a, Result<NodeResponse>> {
        async move {
            let node = self.lookup(target)?;
            node.reset(false).await.map_err(|e| remote_failure(target, e))
        }
        .boxed()
    }
}
