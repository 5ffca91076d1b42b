//! NodeService - one location's rules and state
//!
//! Every operation a client or peer can invoke on a location lands here. All
//! mutations of the location's record and cooldowns happen while holding the
//! node lock; outbound hops are spawned as detached tasks after the lock is
//! released, so a caller only ever waits for its own node.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use super::cooldown::{whole_seconds, CooldownGuard};
use super::response::{LocationStatus, NodeResponse};
use crate::campaign::{
    path_cost, resolve_battle, BattleOutcome, FactionSnapshot, Location, PathPlanner, PathPolicy,
    WorldGraph,
};
use crate::core::config::NodeConfig;
use crate::core::error::{Result, WarError};
use crate::core::types::{Faction, LocationId, LocationKind, TransferId};
use crate::transfer::envelope::{next_hop, ArmyEnvelope, ResourceEnvelope, TransferEnvelope};
use crate::transfer::{Courier, PeerTransport, ShutdownSignal};
use crate::world::LocationStore;

/// Body of `POST /move_army`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveArmyRequest {
    pub target_location: LocationId,
    #[serde(default)]
    pub remaining_path: Vec<LocationId>,
    #[serde(default)]
    pub is_attack_move: bool,
}

/// Body of `POST /reset`; an empty body resets the whole world
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetRequest {
    /// Also reset every peer. Peers are told `false` so they do not fan out again.
    #[serde(default = "propagate_by_default")]
    pub propagate: bool,
}

fn propagate_by_default() -> bool {
    true
}

impl ResetRequest {
    pub fn local_only() -> Self {
        Self { propagate: false }
    }
}

/// What happens to the source army when the first hop cannot be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    /// The army is lost in transit
    Abandon,
    /// Put the army back at the origin (all-out attack, first hop only)
    RestoreOrigin,
}

/// Node-local bookkeeping protected by the node lock
struct NodeGuard {
    cooldowns: CooldownGuard,
    /// Resources shipped toward a next hop but not yet deducted
    reserved: u32,
}

pub struct NodeService {
    location: Location,
    graph: Arc<WorldGraph>,
    config: NodeConfig,
    store: Arc<LocationStore>,
    /// The per-location mutex; every store write happens while it is held
    guard: Mutex<NodeGuard>,
    courier: Courier,
    shutdown: ShutdownSignal,
}

impl NodeService {
    pub fn new(
        id: &LocationId,
        graph: Arc<WorldGraph>,
        config: NodeConfig,
        store: Arc<LocationStore>,
        transport: Arc<dyn PeerTransport>,
        shutdown: ShutdownSignal,
    ) -> Result<Arc<Self>> {
        let location = graph.get(id)?.clone();
        // Fail early if the store was built for another world
        store.get(id)?;

        let courier = Courier::new(transport, config.transit_delay(), shutdown.clone());
        let guard = NodeGuard {
            cooldowns: CooldownGuard::new(&config),
            reserved: 0,
        };
        Ok(Arc::new(Self {
            location,
            guard: Mutex::new(guard),
            graph,
            config,
            store,
            courier,
            shutdown,
        }))
    }

    pub fn id(&self) -> &LocationId {
        &self.location.id
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn store(&self) -> &Arc<LocationStore> {
        &self.store
    }

    fn require_kind(&self, required: LocationKind, operation: &'static str) -> Result<()> {
        if self.location.kind != required {
            return Err(WarError::WrongLocationKind {
                operation,
                required,
            });
        }
        Ok(())
    }

    /// `GET /`
    pub async fn status(&self) -> Result<LocationStatus> {
        let guard = self.guard.lock().await;
        let state = self.store.get(self.id())?;
        let now = Instant::now();
        let cooldown = match self.location.kind {
            LocationKind::Capital => guard.cooldowns.collect_remaining(now),
            LocationKind::Village => guard.cooldowns.send_remaining(now),
        };

        Ok(LocationStatus {
            location_id: self.location.id.clone(),
            name: self.location.name.clone(),
            kind: self.location.kind,
            faction: state.faction,
            connections: self.location.connections.clone(),
            resources: state.resources,
            army: state.army,
            resource_cooldown: cooldown.map(whole_seconds),
            transfers: self.courier.stats().counts(),
        })
    }

    /// `POST /collect_resources`
    pub async fn collect_resources(&self) -> Result<NodeResponse> {
        self.require_kind(LocationKind::Capital, "manually collect resources")?;

        let mut guard = self.guard.lock().await;
        let now = Instant::now();
        if let Some(wait) = guard.cooldowns.collect_remaining(now) {
            let seconds = whole_seconds(wait);
            return Ok(NodeResponse::on_cooldown(
                format!("Must wait {} seconds to collect resources", seconds),
                seconds,
            ));
        }

        let gained = self.graph.economy().generation(self.location.kind);
        let current = self
            .store
            .update(self.id(), |state| Ok(state.add_resources(gained)))?;
        guard.cooldowns.start_collect(now);

        tracing::info!(
            "{} collected {} resources ({} total)",
            self.location.name,
            gained,
            current
        );
        Ok(NodeResponse::ok(format!("Collected {} resources", gained))
            .with_resources(current)
            .with_cooldown(false))
    }

    /// `POST /create_army`
    pub async fn create_army(&self) -> Result<NodeResponse> {
        self.require_kind(LocationKind::Capital, "create armies")?;
        let cost = self.graph.economy().army_cost;

        let _guard = self.guard.lock().await;
        let (army, resources) = self.store.update(self.id(), |state| {
            if state.resources < cost {
                return Err(WarError::InsufficientResources {
                    need: cost,
                    have: state.resources,
                });
            }
            state.remove_resources(cost);
            state.add_army(1);
            Ok((state.army, state.resources))
        })?;

        tracing::info!("{} raised an army unit ({} total)", self.location.name, army);
        Ok(NodeResponse::ok("Army created")
            .with_army(army)
            .with_resources(resources))
    }

    /// `POST /move_army`
    pub async fn move_army(self: &Arc<Self>, request: MoveArmyRequest) -> Result<NodeResponse> {
        let target = request.target_location;
        if !self.location.is_connected_to(&target) {
            return Err(WarError::NotConnected {
                from: self.id().clone(),
                target,
            });
        }
        self.check_route(&target, &request.remaining_path)?;

        let (army, faction) = {
            let _guard = self.guard.lock().await;
            self.store.update(self.id(), |state| {
                if state.faction.is_neutral() {
                    return Err(WarError::WrongFaction(Faction::Neutral));
                }
                if state.army == 0 {
                    return Err(WarError::NoArmy);
                }
                Ok((state.take_army(), state.faction))
            })?
        };

        let mut path = vec![self.id().clone(), target.clone()];
        path.extend(request.remaining_path.iter().cloned());

        let envelope = ArmyEnvelope {
            army_size: army,
            faction,
            source_location: self.id().clone(),
            remaining_path: request.remaining_path,
            is_attack_move: request.is_attack_move,
            origin: Some(self.id().clone()),
            transfer_id: Some(TransferId::new()),
        };
        // The army already left; a refused dispatch means it is gone
        self.dispatch_army(target.clone(), envelope, Recovery::Abandon)?;

        tracing::info!("{} sent {} troops toward {}", self.location.name, army, target);
        Ok(NodeResponse::ok(format!(
            "Army movement started from {} to {}",
            self.id(),
            target
        ))
        .with_army_size(army)
        .with_attack_move(request.is_attack_move)
        .with_path(path))
    }

    /// `POST /all_out_attack`
    pub async fn all_out_attack(self: &Arc<Self>) -> Result<NodeResponse> {
        self.require_kind(LocationKind::Capital, "launch all-out attacks")?;
        let mut snapshot = self.faction_snapshot().await;

        let (army, faction, path) = {
            let _guard = self.guard.lock().await;
            let state = self.store.get(self.id())?;
            if state.army == 0 {
                return Err(WarError::NoArmy);
            }

            let enemy = self
                .graph
                .enemy_capital(self.id(), state.faction)
                .ok_or_else(|| {
                    WarError::InvalidTransfer("no enemy capital left to attack".into())
                })?;

            snapshot.insert(self.id().clone(), state.faction);
            let path = PathPlanner::new(&self.graph)
                .find_path(
                    self.id(),
                    &enemy.id,
                    PathPolicy::Military,
                    state.faction,
                    &snapshot,
                )
                .filter(|path| path.len() > 1)
                .ok_or_else(|| WarError::NoPath {
                    from: self.id().clone(),
                    to: enemy.id.clone(),
                })?;

            let army = self.store.update(self.id(), |state| Ok(state.take_army()))?;
            (army, state.faction, path)
        };

        let envelope = ArmyEnvelope {
            army_size: army,
            faction,
            source_location: self.id().clone(),
            remaining_path: path[2..].to_vec(),
            is_attack_move: true,
            origin: Some(self.id().clone()),
            transfer_id: Some(TransferId::new()),
        };

        if let Err(e) = self.dispatch_army(path[1].clone(), envelope, Recovery::RestoreOrigin) {
            self.restore_army(army, faction).await;
            return Err(e);
        }

        tracing::info!(
            cost = ?path_cost(&path, PathPolicy::Military, faction, &snapshot),
            "{} launched an all-out attack with {} troops via {}",
            self.location.name,
            army,
            join_path(&path)
        );
        Ok(
            NodeResponse::ok(format!("All-out attack started with {} troops", army))
                .with_path(path)
                .with_army_size(army)
                .with_attack_move(true),
        )
    }

    /// `POST /send_resources_to_capital`
    ///
    /// Ships whatever is not already on its way to a next hop. The shipped
    /// amount stays reserved until that hop is settled.
    pub async fn send_resources_to_capital(self: &Arc<Self>) -> Result<NodeResponse> {
        self.require_kind(LocationKind::Village, "send resources to capital")?;
        let mut snapshot = self.faction_snapshot().await;

        let (amount, faction, path) = {
            let mut guard = self.guard.lock().await;
            let state = self.store.get(self.id())?;
            if state.faction.is_neutral() {
                return Err(WarError::WrongFaction(Faction::Neutral));
            }

            let now = Instant::now();
            if let Some(wait) = guard.cooldowns.send_remaining(now) {
                let seconds = whole_seconds(wait);
                return Ok(NodeResponse::on_cooldown(
                    format!("Resource sending on cooldown for {} seconds", seconds),
                    seconds,
                ));
            }

            let available = state.resources.saturating_sub(guard.reserved);
            if available == 0 {
                return Err(WarError::InsufficientResources { need: 1, have: 0 });
            }

            let capital = self.graph.capital_of(state.faction).ok_or_else(|| {
                WarError::InvalidTransfer(format!("{} has no capital", state.faction))
            })?;

            snapshot.insert(self.id().clone(), state.faction);
            let path = PathPlanner::new(&self.graph)
                .find_path(
                    self.id(),
                    &capital.id,
                    PathPolicy::Logistics,
                    state.faction,
                    &snapshot,
                )
                .filter(|path| path.len() > 1)
                .ok_or_else(|| WarError::NoPath {
                    from: self.id().clone(),
                    to: capital.id.clone(),
                })?;

            guard.cooldowns.start_send(now);
            guard.reserved = guard.reserved.saturating_add(available);
            (available, state.faction, path)
        };

        let envelope = ResourceEnvelope {
            resources: amount,
            faction,
            source_location: self.id().clone(),
            remaining_path: path[2..].to_vec(),
            origin: Some(self.id().clone()),
            transfer_id: Some(TransferId::new()),
        };
        if let Err(e) = self.dispatch_resources(path[1].clone(), envelope) {
            self.settle_resources(amount, false).await;
            return Err(e);
        }

        tracing::info!(
            cost = ?path_cost(&path, PathPolicy::Logistics, faction, &snapshot),
            "{} sending {} resources via {}",
            self.location.name,
            amount,
            join_path(&path)
        );
        Ok(NodeResponse::ok(format!(
            "Sending {} resources to capital via {}",
            amount,
            join_path(&path)
        ))
        .with_path(path)
        .with_amount(amount))
    }

    /// `POST /receive_army`
    pub async fn receive_army(self: &Arc<Self>, envelope: ArmyEnvelope) -> Result<NodeResponse> {
        if envelope.army_size == 0 {
            return Err(WarError::InvalidTransfer("army_size must be positive".into()));
        }
        if envelope.faction.is_neutral() {
            return Err(WarError::InvalidTransfer("neutral armies cannot march".into()));
        }

        let name = &self.location.name;
        let next = self.next_hop_from(&envelope.remaining_path);

        let guard = self.guard.lock().await;
        let state = self.store.get(self.id())?;

        if envelope.faction == state.faction {
            if !envelope.is_attack_move {
                let army = self
                    .store
                    .update(self.id(), |state| Ok(state.add_army(envelope.army_size)))?;
                tracing::info!("Armies combined at {}: {}", name, army);
                return Ok(NodeResponse::ok(format!("Armies combined at {}", name))
                    .with_army(army)
                    .with_faction(state.faction)
                    .with_battle(BattleOutcome::Reinforcement));
            }

            // Friendly villages on an attack route join the march
            let absorb = self.location.kind == LocationKind::Village;
            let moving = self.store.update(self.id(), |state| {
                let garrison = if absorb { state.take_army() } else { 0 };
                let moving = envelope.army_size.saturating_add(garrison);
                if next.is_none() {
                    state.add_army(moving);
                }
                Ok(moving)
            })?;
            drop(guard);

            let Some((next_id, rest)) = next else {
                if self.location.is_capital() {
                    tracing::warn!(
                        "Attack move returned to own capital {} with {} troops",
                        name,
                        moving
                    );
                } else {
                    tracing::warn!(
                        "Attack move ended at friendly village {} with {} troops",
                        name,
                        moving
                    );
                }
                return Ok(NodeResponse::ok(format!("Army movement ended at {}", name))
                    .with_army(self.store.get(self.id())?.army)
                    .with_faction(state.faction));
            };

            tracing::info!(
                "Attack passing through {} toward {} with {} troops",
                name,
                next_id,
                moving
            );
            self.forward_army(&envelope, moving, next_id, rest)?;
            return Ok(NodeResponse::ok(format!(
                "Army passing through {} toward {}",
                name, next_id
            ))
            .with_army_size(moving)
            .with_faction(state.faction)
            .with_attack_move(true));
        }

        let result = resolve_battle(
            envelope.army_size,
            envelope.faction,
            state.army,
            state.faction,
        );
        let continues = result.outcome == BattleOutcome::AttackerVictory
            && envelope.is_attack_move
            && next.is_some();

        self.store.update(self.id(), |state| {
            state.faction = result.owner;
            // A victorious army marching on leaves the captured location empty
            state.army = if continues { 0 } else { result.remaining_army };
            Ok(())
        })?;
        drop(guard);

        tracing::info!(
            outcome = %result.outcome,
            "Battle at {}: {} {} vs {} {}, {} remain for {}",
            name,
            envelope.faction,
            envelope.army_size,
            state.faction,
            state.army,
            result.remaining_army,
            result.owner
        );
        if result.owner != state.faction {
            tracing::info!("{} captured by {}", name, result.owner);
        }

        if let (true, Some((next_id, rest))) = (continues, next) {
            tracing::info!("Victorious army moving on from {} to {}", name, next_id);
            self.forward_army(&envelope, result.remaining_army, next_id, rest)?;
            return Ok(NodeResponse::ok(format!(
                "Battle at {}: {}, army continues to {}",
                name, result.outcome, next_id
            ))
            .with_army_size(result.remaining_army)
            .with_faction(result.owner)
            .with_battle(result.outcome)
            .with_attack_move(true));
        }

        if result.outcome != BattleOutcome::AttackerVictory {
            tracing::warn!("Battle result at {}: {}", name, result.outcome);
        }
        let response = NodeResponse {
            success: result.outcome == BattleOutcome::AttackerVictory,
            message: format!("Battle at {}: {}", name, result.outcome),
            ..NodeResponse::default()
        };
        Ok(response
            .with_army(result.remaining_army)
            .with_faction(result.owner)
            .with_battle(result.outcome))
    }

    /// `POST /receive_resources`
    pub async fn receive_resources(
        self: &Arc<Self>,
        envelope: ResourceEnvelope,
    ) -> Result<NodeResponse> {
        if envelope.resources == 0 {
            return Err(WarError::InvalidTransfer("resources must be positive".into()));
        }
        if envelope.faction.is_neutral() {
            return Err(WarError::InvalidTransfer("neutral convoys do not exist".into()));
        }

        let name = &self.location.name;
        let next = self.next_hop_from(&envelope.remaining_path);

        let mut guard = self.guard.lock().await;
        let state = self.store.get(self.id())?;
        let current = self
            .store
            .update(self.id(), |state| Ok(state.add_resources(envelope.resources)))?;
        let captured = state.faction != envelope.faction;
        let forward = if captured { None } else { next };
        if forward.is_some() {
            guard.reserved = guard.reserved.saturating_add(envelope.resources);
        }
        drop(guard);

        if captured {
            tracing::warn!(
                "{} resources from {} captured by {} at {}",
                envelope.resources,
                envelope.faction,
                state.faction,
                name
            );
            return Ok(
                NodeResponse::failure(format!("Resources captured by {}!", state.faction))
                    .with_resources(current)
                    .captured(),
            );
        }

        if let Some((next_id, rest)) = forward {
            let onward = ResourceEnvelope {
                source_location: self.id().clone(),
                remaining_path: rest.to_vec(),
                ..envelope.clone()
            };
            if let Err(e) = self.dispatch_resources(next_id.clone(), onward) {
                self.settle_resources(envelope.resources, false).await;
                return Err(e);
            }
            tracing::info!(
                "Forwarding {} resources from {} to {}",
                envelope.resources,
                name,
                next_id
            );
        } else if self.location.is_capital() {
            tracing::info!("{} resources delivered to {}", envelope.resources, name);
        }

        Ok(NodeResponse::ok(format!("Resources received at {}", name)).with_resources(current))
    }

    /// `POST /reset`
    ///
    /// Restores this location to its configured defaults; with `propagate`
    /// every peer is reset as well, so one call resets the whole world.
    pub async fn reset(&self, propagate: bool) -> Result<NodeResponse> {
        {
            let mut guard = self.guard.lock().await;
            self.store.reset()?;
            guard.cooldowns.clear();
            guard.reserved = 0;
        }
        tracing::info!("{} reset to initial values", self.location.name);

        if !propagate {
            return Ok(NodeResponse::ok(format!(
                "{} reset to initial values",
                self.location.name
            )));
        }

        let unreachable = self.reset_peers().await;
        if unreachable.is_empty() {
            return Ok(NodeResponse::ok("Game state reset to initial values"));
        }
        tracing::warn!("Reset did not reach {}", join_path(&unreachable));
        Ok(NodeResponse::failure(format!(
            "Game state reset, but {} could not be reached",
            join_path(&unreachable)
        )))
    }

    /// Reset every peer in parallel; returns the ones that failed
    async fn reset_peers(&self) -> Vec<LocationId> {
        let mut resets = JoinSet::new();
        for peer in self.graph.ids().iter().filter(|id| *id != self.id()) {
            let transport = Arc::clone(self.courier.transport());
            let peer = peer.clone();
            resets.spawn(async move {
                let reply = transport.reset(&peer).await;
                (peer, reply)
            });
        }

        let mut unreachable = Vec::new();
        while let Some(joined) = resets.join_next().await {
            match joined {
                Ok((_, Ok(reply))) if reply.success => {}
                Ok((peer, Ok(reply))) => {
                    tracing::warn!("{} refused reset: {}", peer, reply.message);
                    unreachable.push(peer);
                }
                Ok((peer, Err(e))) => {
                    tracing::warn!("Could not reset {}: {}", peer, e);
                    unreachable.push(peer);
                }
                Err(e) => tracing::error!("Reset task failed: {}", e),
            }
        }
        unreachable.sort();
        unreachable
    }

    /// Start passive income for villages; capitals get `None`
    pub fn spawn_passive_generation(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.location.kind != LocationKind::Village {
            return None;
        }

        let node = Arc::clone(self);
        let period = self.config.passive_interval();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => node.generate_passive().await,
                    _ = node.shutdown.cancelled() => break,
                }
            }
        }))
    }

    async fn generate_passive(&self) {
        let name = &self.location.name;
        let amount = self.graph.economy().generation(self.location.kind);
        let _guard = self.guard.lock().await;
        match self
            .store
            .update(self.id(), |state| Ok(state.add_resources(amount)))
        {
            Ok(total) => {
                tracing::debug!("{} generated {} resources ({} total)", name, amount, total)
            }
            Err(e) => tracing::error!("Passive generation failed at {}: {}", name, e),
        }
    }

    /// Factions of every location, this one from the store and peers from
    /// their live status. Unreachable peers are left out.
    pub async fn faction_snapshot(&self) -> FactionSnapshot {
        let mut snapshot = FactionSnapshot::new();
        if let Ok(state) = self.store.get(self.id()) {
            snapshot.insert(self.id().clone(), state.faction);
        }

        let mut queries = JoinSet::new();
        for peer in self.graph.ids().iter().filter(|id| *id != self.id()) {
            let transport = Arc::clone(self.courier.transport());
            let peer = peer.clone();
            queries.spawn(async move {
                let status = transport.status(&peer).await;
                (peer, status)
            });
        }

        while let Some(joined) = queries.join_next().await {
            match joined {
                Ok((_, Ok(status))) => snapshot.insert(status.location_id, status.faction),
                Ok((peer, Err(e))) => tracing::debug!("No status from {}: {}", peer, e),
                Err(e) => tracing::error!("Status query task failed: {}", e),
            }
        }
        snapshot
    }

    /// Every hop of a caller-supplied route must follow an edge
    fn check_route(&self, first: &LocationId, rest: &[LocationId]) -> Result<()> {
        let mut current = first;
        for hop in rest {
            if !self.graph.get(current)?.is_connected_to(hop) {
                return Err(WarError::InvalidTransfer(format!(
                    "{} is not connected to {}",
                    current, hop
                )));
            }
            current = hop;
        }
        Ok(())
    }

    /// Next hop and tail, if the head of `remaining` is adjacent to this node
    fn next_hop_from<'p>(
        &self,
        remaining: &'p [LocationId],
    ) -> Option<(&'p LocationId, &'p [LocationId])> {
        let (next, rest) = next_hop(remaining)?;
        if self.location.is_connected_to(next) {
            Some((next, rest))
        } else {
            tracing::warn!(
                "{} is not connected to {}; transfer ends here",
                self.location.name,
                next
            );
            None
        }
    }

    fn forward_army(
        self: &Arc<Self>,
        incoming: &ArmyEnvelope,
        army: u32,
        next: &LocationId,
        rest: &[LocationId],
    ) -> Result<()> {
        let envelope = ArmyEnvelope {
            army_size: army,
            source_location: self.id().clone(),
            remaining_path: rest.to_vec(),
            ..incoming.clone()
        };
        self.dispatch_army(next.clone(), envelope, Recovery::Abandon)
    }

    /// Spawn the hop task for an army that already left this node
    fn dispatch_army(
        self: &Arc<Self>,
        target: LocationId,
        envelope: ArmyEnvelope,
        recovery: Recovery,
    ) -> Result<()> {
        let id = envelope.transfer_id.unwrap_or_default();
        self.courier.initiate(id, self.id(), &target)?;

        let node = Arc::clone(self);
        let origin = envelope.origin.clone().unwrap_or_else(|| self.id().clone());
        let faction = envelope.faction;
        let army = envelope.army_size;
        let envelope = TransferEnvelope::Army(envelope);
        tokio::spawn(async move {
            match node.courier.carry(id, &target, &envelope).await {
                Ok(reply) if !reply.success => {
                    tracing::warn!(
                        transfer = %id,
                        origin = %origin,
                        "Army movement to {} failed: {}",
                        target,
                        reply.message
                    );
                }
                Ok(_) => {}
                Err(_) if recovery == Recovery::RestoreOrigin => {
                    node.restore_army(army, faction).await;
                }
                Err(_) => {
                    tracing::error!(
                        transfer = %id,
                        origin = %origin,
                        "{} troops from {} lost between {} and {}",
                        army,
                        origin,
                        node.id(),
                        target
                    );
                }
            }
        });
        Ok(())
    }

    /// Spawn the hop task for resources still held here; they are deducted
    /// once the next node has taken them. The caller has reserved `resources`.
    fn dispatch_resources(
        self: &Arc<Self>,
        target: LocationId,
        envelope: ResourceEnvelope,
    ) -> Result<()> {
        let id = envelope.transfer_id.unwrap_or_default();
        self.courier.initiate(id, self.id(), &target)?;

        let node = Arc::clone(self);
        let origin = envelope.origin.clone().unwrap_or_else(|| self.id().clone());
        let amount = envelope.resources;
        let envelope = TransferEnvelope::Resources(envelope);
        tokio::spawn(async move {
            let delivered = match node.courier.carry(id, &target, &envelope).await {
                Ok(reply) if reply.accepted() => true,
                Ok(reply) => {
                    tracing::warn!(
                        transfer = %id,
                        origin = %origin,
                        "{} refused resources: {}",
                        target,
                        reply.message
                    );
                    false
                }
                Err(_) => {
                    tracing::error!(
                        transfer = %id,
                        origin = %origin,
                        "{} resources from {} stay at {}",
                        amount,
                        origin,
                        node.id()
                    );
                    false
                }
            };
            node.settle_resources(amount, delivered).await;
        });
        Ok(())
    }

    /// Release a reservation, deducting it if the next hop took the resources
    async fn settle_resources(&self, amount: u32, delivered: bool) {
        let name = &self.location.name;
        let mut guard = self.guard.lock().await;
        guard.reserved = guard.reserved.saturating_sub(amount);
        if !delivered {
            return;
        }

        match self.store.update(self.id(), |state| {
            Ok((state.remove_resources(amount), state.resources))
        }) {
            Ok((removed, left)) => {
                if removed < amount {
                    // Only after a reset while the convoy was on its way
                    tracing::warn!("{} could only cover {} of {}", name, removed, amount);
                }
                tracing::info!("{} resources left {} ({} remain)", removed, name, left);
            }
            Err(e) => tracing::error!("Could not deduct resources at {}: {}", name, e),
        }
    }

    /// Return an army that never left (all-out attack first hop)
    async fn restore_army(&self, army: u32, faction: Faction) {
        let name = &self.location.name;
        let _guard = self.guard.lock().await;
        let restored = self.store.update(self.id(), |state| {
            if state.faction != faction {
                return Ok(None);
            }
            Ok(Some(state.add_army(army)))
        });
        match restored {
            Ok(Some(total)) => tracing::warn!(
                "Attack failed to start; {} troops back at {} ({} total)",
                army,
                name,
                total
            ),
            Ok(None) => {
                tracing::error!("{} changed hands; {} returning troops are lost", name, army)
            }
            Err(e) => tracing::error!("Could not restore army at {}: {}", name, e),
        }
    }
}

fn join_path(path: &[LocationId]) -> String {
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}
