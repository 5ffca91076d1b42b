//! Courier - carries one hop of a transfer
//!
//! Every hop goes through the same lifecycle: initiated by the sending node,
//! in transit during the artificial delay and the outbound call, then either
//! delivered (the next node answered) or lost (it did not). Hops are tried
//! exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::envelope::TransferEnvelope;
use super::shutdown::ShutdownSignal;
use super::transport::PeerTransport;
use crate::core::error::{Result, WarError};
use crate::core::types::{LocationId, TransferId};
use crate::node::response::{NodeResponse, TransferCounts};

/// Lifecycle phase of a hop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Initiated,
    InTransit,
    Delivered,
    Lost,
}

impl std::fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initiated => "initiated",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Lost => "lost",
        };
        f.write_str(name)
    }
}

/// Hop counters, shared between a node and its courier
#[derive(Debug, Default)]
pub struct TransferStats {
    in_transit: AtomicU64,
    delivered: AtomicU64,
    lost: AtomicU64,
}

impl TransferStats {
    pub fn counts(&self) -> TransferCounts {
        TransferCounts {
            in_transit: self.in_transit.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
        }
    }

    fn record(&self, phase: TransferPhase) {
        match phase {
            TransferPhase::Initiated => {}
            TransferPhase::InTransit => {
                self.in_transit.fetch_add(1, Ordering::Relaxed);
            }
            TransferPhase::Delivered => {
                self.in_transit.fetch_sub(1, Ordering::Relaxed);
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            TransferPhase::Lost => {
                self.in_transit.fetch_sub(1, Ordering::Relaxed);
                self.lost.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Carries hops from one node to the next
pub struct Courier {
    transport: Arc<dyn PeerTransport>,
    transit_delay: Duration,
    shutdown: ShutdownSignal,
    stats: Arc<TransferStats>,
}

impl Courier {
    pub fn new(
        transport: Arc<dyn PeerTransport>,
        transit_delay: Duration,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            transport,
            transit_delay,
            shutdown,
            stats: Arc::new(TransferStats::default()),
        }
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub fn transport(&self) -> &Arc<dyn PeerTransport> {
        &self.transport
    }

    /// Accept a new hop; fails only when the node is shutting down
    pub fn initiate(&self, id: TransferId, from: &LocationId, target: &LocationId) -> Result<()> {
        if self.shutdown.is_triggered() {
            return Err(WarError::ShuttingDown);
        }
        tracing::debug!(
            transfer = %id,
            phase = %TransferPhase::Initiated,
            "Hop {} -> {} accepted",
            from,
            target
        );
        Ok(())
    }

    /// Wait the transit delay, then deliver the envelope to `target`
    ///
    /// Returns the receiving node's answer, or the transit failure that ended
    /// the hop. Shutdown during the delay also counts as lost.
    pub async fn carry(
        &self,
        id: TransferId,
        target: &LocationId,
        envelope: &TransferEnvelope,
    ) -> Result<NodeResponse> {
        self.stats.record(TransferPhase::InTransit);
        tracing::debug!(
            transfer = %id,
            phase = %TransferPhase::InTransit,
            kind = ?envelope.kind(),
            amount = envelope.amount(),
            "Carrying to {}",
            target
        );

        tokio::select! {
            _ = tokio::time::sleep(self.transit_delay) => {}
            _ = self.shutdown.cancelled() => {
                self.stats.record(TransferPhase::Lost);
                tracing::warn!(
                    transfer = %id,
                    phase = %TransferPhase::Lost,
                    "Shutdown while in transit to {}",
                    target
                );
                return Err(WarError::ShuttingDown);
            }
        }

        match self.transport.deliver(target, envelope).await {
            Ok(reply) => {
                self.stats.record(TransferPhase::Delivered);
                tracing::info!(
                    transfer = %id,
                    phase = %TransferPhase::Delivered,
                    success = reply.success,
                    "{} reached {}: {}",
                    describe(envelope),
                    target,
                    reply.message
                );
                Ok(reply)
            }
            Err(e) => {
                self.stats.record(TransferPhase::Lost);
                tracing::error!(
                    transfer = %id,
                    phase = %TransferPhase::Lost,
                    "{} lost on the way to {}: {}",
                    describe(envelope),
                    target,
                    e
                );
                Err(e)
            }
        }
    }
}

fn describe(envelope: &TransferEnvelope) -> String {
    match envelope {
        TransferEnvelope::Army(army) => format!("Army of {}", army.army_size),
        TransferEnvelope::Resources(cargo) => format!("{} resources", cargo.resources),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Faction;
    use crate::node::response::LocationStatus;
    use crate::transfer::envelope::ArmyEnvelope;
    use crate::transfer::shutdown::Shutdown;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::Mutex;

    /// Records deliveries and answers with a canned result
    struct Recorder {
        fail: bool,
        seen: Mutex<Vec<(LocationId, u32)>>,
    }

    impl PeerTransport for Recorder {
        fn deliver<'a>(
            &'a self,
            target: &'a LocationId,
            envelope: &'a TransferEnvelope,
        ) -> BoxFuture<'a, Result<NodeResponse>> {
            async move {
                self.seen
                    .lock()
                    .unwrap()
                    .push((target.clone(), envelope.amount()));
                if self.fail {
                    Err(WarError::Transit {
                        target: target.clone(),
                        reason: "connection refused".into(),
                    })
                } else {
                    Ok(NodeResponse::ok("received"))
                }
            }
            .boxed()
        }

        fn status<'a>(&'a self, target: &'a LocationId) -> BoxFuture<'a, Result<LocationStatus>> {
            async move { Err(WarError::UnknownLocation(target.clone())) }.boxed()
        }

        fn reset<'a>(&'a self, _target: &'a LocationId) -> BoxFuture<'a, Result<NodeResponse>> {
            async move { Ok(NodeResponse::ok("reset")) }.boxed()
        }
    }

    fn army(size: u32) -> TransferEnvelope {
        TransferEnvelope::Army(ArmyEnvelope {
            army_size: size,
            faction: Faction::Southern,
            source_location: "southern_capital".into(),
            remaining_path: vec![],
            is_attack_move: false,
            origin: None,
            transfer_id: None,
        })
    }

    fn recorder(fail: bool) -> Arc<Recorder> {
        Arc::new(Recorder {
            fail,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_hop_waits_transit_delay() {
        let transport = recorder(false);
        let courier = Courier::new(
            transport.clone(),
            Duration::from_secs(5),
            ShutdownSignal::never(),
        );
        let start = tokio::time::Instant::now();

        let reply = courier
            .carry(TransferId::new(), &"village_1".into(), &army(3))
            .await
            .unwrap();

        assert!(reply.success);
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(
            *transport.seen.lock().unwrap(),
            vec![(LocationId::from("village_1"), 3)]
        );
        assert_eq!(
            courier.stats().counts(),
            TransferCounts {
                in_transit: 0,
                delivered: 1,
                lost: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_hop_is_lost_not_retried() {
        let transport = recorder(true);
        let courier = Courier::new(
            transport.clone(),
            Duration::from_secs(1),
            ShutdownSignal::never(),
        );

        let result = courier.carry(TransferId::new(), &"village_1".into(), &army(3)).await;

        assert!(matches!(result, Err(WarError::Transit { .. })));
        assert_eq!(transport.seen.lock().unwrap().len(), 1);
        assert_eq!(courier.stats().counts().lost, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_delay_skips_delivery() {
        let transport = recorder(false);
        let shutdown = Shutdown::new();
        let courier = Courier::new(transport.clone(), Duration::from_secs(60), shutdown.signal());

        shutdown.trigger();
        let result = courier.carry(TransferId::new(), &"village_1".into(), &army(3)).await;

        assert!(matches!(result, Err(WarError::ShuttingDown)));
        assert!(transport.seen.lock().unwrap().is_empty());
        assert!(courier.initiate(TransferId::new(), &"a".into(), &"b".into()).is_err());
    }
}
