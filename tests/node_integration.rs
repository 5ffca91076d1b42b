//! Multi-node scenarios over the in-process transport
//!
//! Every node gets its own store, as it would in its own process. Time is
//! paused, so transit delays elapse instantly once every task is waiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use war_of_kingdoms::campaign::{resolve_battle, BattleOutcome, LocationState};
use war_of_kingdoms::core::error::{Result, WarError};
use war_of_kingdoms::core::types::{Faction, LocationId};
use war_of_kingdoms::node::{LocationStatus, MoveArmyRequest, NodeResponse, NodeService};
use war_of_kingdoms::transfer::{
    ArmyEnvelope, LocalTransport, PeerTransport, Shutdown, TransferEnvelope,
};
use war_of_kingdoms::world::{load_world_from_str, LocationStore};

/// capital_a - village_1 - capital_b, plus a southern supply line
/// capital_a - village_2 - village_3
const FRONTIER: &str = r#"
[[locations]]
id = "capital_a"
name = "Capital A"
type = "capital"
faction = "southern"
connections = ["village_1", "village_2"]
initial_resources = 100
initial_army = 5
port = 6001

[[locations]]
id = "village_1"
name = "Village 1"
type = "village"
faction = "neutral"
connections = ["capital_a", "capital_b"]
initial_resources = 0
initial_army = 2
port = 6002

[[locations]]
id = "capital_b"
name = "Capital B"
type = "capital"
faction = "northern"
connections = ["village_1"]
initial_resources = 100
initial_army = 1
port = 6003

[[locations]]
id = "village_2"
name = "Village 2"
type = "village"
faction = "southern"
connections = ["capital_a", "village_3"]
initial_resources = 40
initial_army = 0
port = 6004

[[locations]]
id = "village_3"
name = "Village 3"
type = "village"
faction = "southern"
connections = ["village_2"]
initial_resources = 30
initial_army = 0
port = 6005
"#;

struct Mesh {
    transport: Arc<LocalTransport>,
    nodes: HashMap<LocationId, Arc<NodeService>>,
    shutdown: Shutdown,
}

impl Mesh {
    fn new(world: &str) -> Self {
        Self::with_transport(world, |local| local)
    }

    /// Nodes send through whatever `wrap` builds around the in-process transport
    fn with_transport<T, F>(world: &str, wrap: F) -> Self
    where
        T: PeerTransport + 'static,
        F: FnOnce(Arc<LocalTransport>) -> Arc<T>,
    {
        let loaded = load_world_from_str(world).unwrap();
        let graph = Arc::new(loaded.graph);
        let transport = LocalTransport::new();
        let outbound: Arc<dyn PeerTransport> = wrap(transport.clone());
        let shutdown = Shutdown::new();

        let mut nodes = HashMap::new();
        for id in graph.ids() {
            let store = Arc::new(LocationStore::in_memory(&graph));
            let node = NodeService::new(
                id,
                Arc::clone(&graph),
                loaded.config.clone(),
                store,
                Arc::clone(&outbound),
                shutdown.signal(),
            )
            .unwrap();
            transport.register(&node);
            nodes.insert(id.clone(), node);
        }

        Self {
            transport,
            nodes,
            shutdown,
        }
    }

    fn node(&self, id: &str) -> &Arc<NodeService> {
        &self.nodes[&LocationId::from(id)]
    }

    fn state(&self, id: &str) -> LocationState {
        self.node(id).store().get(&id.into()).unwrap()
    }

    fn set_state(&self, id: &str, faction: Faction, army: u32) {
        self.node(id)
            .store()
            .update(&id.into(), |state| {
                state.faction = faction;
                state.army = army;
                Ok(())
            })
            .unwrap();
    }
}

/// Adds latency to every delivery on top of the transit delay
struct SlowTransport {
    inner: Arc<LocalTransport>,
    latency: Duration,
}

impl PeerTransport for SlowTransport {
    fn deliver<'a>(
        &'a self,
        target: &'a LocationId,
        envelope: &'a TransferEnvelope,
    ) -> BoxFuture<'a, Result<NodeResponse>> {
        async move {
            tokio::time::sleep(self.latency).await;
            self.inner.deliver(target, envelope).await
        }
        .boxed()
    }

    fn status<'a>(&'a self, target: &'a LocationId) -> BoxFuture<'a, Result<LocationStatus>> {
        self.inner.status(target)
    }

    fn reset<'a>(&'a self, target: &'a LocationId) -> BoxFuture<'a, Result<NodeResponse>> {
        self.inner.reset(target)
    }
}

async fn wait_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

fn march(target: &str) -> MoveArmyRequest {
    MoveArmyRequest {
        target_location: target.into(),
        remaining_path: vec![],
        is_attack_move: false,
    }
}

#[tokio::test(start_paused = true)]
async fn test_all_out_attack_conquers_enemy_capital() {
    let mesh = Mesh::new(FRONTIER);

    let reply = mesh.node("capital_a").all_out_attack().await.unwrap();
    assert!(reply.success);
    assert_eq!(reply.army_size, Some(5));
    assert_eq!(
        reply.path.unwrap(),
        vec![
            LocationId::from("capital_a"),
            LocationId::from("village_1"),
            LocationId::from("capital_b"),
        ]
    );
    assert_eq!(mesh.state("capital_a").army, 0);

    // First hop lands after one transit delay
    wait_secs(6).await;
    let village = mesh.state("village_1");
    assert_eq!(village.faction, Faction::Southern);
    assert_eq!(village.army, 0);

    wait_secs(5).await;
    let capital = mesh.state("capital_b");
    assert_eq!(capital.faction, Faction::Southern);
    assert_eq!(capital.army, 2);
}

#[tokio::test(start_paused = true)]
async fn test_attack_without_army_rejected() {
    let mesh = Mesh::new(FRONTIER);
    mesh.node("capital_a").all_out_attack().await.unwrap();

    let result = mesh.node("capital_a").all_out_attack().await;
    assert!(matches!(result, Err(WarError::NoArmy)));

    let result = mesh.node("village_2").all_out_attack().await;
    assert!(matches!(result, Err(WarError::WrongLocationKind { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_repelled_attack_leaves_defender() {
    let mesh = Mesh::new(FRONTIER);
    let village_1 = mesh.node("village_1");

    let reply = village_1
        .receive_army(ArmyEnvelope {
            army_size: 1,
            faction: Faction::Northern,
            source_location: "capital_b".into(),
            remaining_path: vec![],
            is_attack_move: true,
            origin: None,
            transfer_id: None,
        })
        .await
        .unwrap();

    assert!(!reply.success);
    assert_eq!(reply.battle, Some(BattleOutcome::DefenderVictory));
    assert_eq!(mesh.state("village_1").army, 1);
    assert_eq!(mesh.state("village_1").faction, Faction::Neutral);
}

#[tokio::test(start_paused = true)]
async fn test_resources_deducted_after_delivery() {
    let mesh = Mesh::new(FRONTIER);

    let reply = mesh
        .node("village_2")
        .send_resources_to_capital()
        .await
        .unwrap();
    assert!(reply.success);
    assert_eq!(reply.amount, Some(40));

    // Still held while in transit
    assert_eq!(mesh.state("village_2").resources, 40);

    wait_secs(6).await;
    assert_eq!(mesh.state("village_2").resources, 0);
    assert_eq!(mesh.state("capital_a").resources, 140);
}

#[tokio::test(start_paused = true)]
async fn test_send_cooldown() {
    let mesh = Mesh::new(FRONTIER);
    let village = mesh.node("village_2");

    assert!(village.send_resources_to_capital().await.unwrap().success);

    let reply = village.send_resources_to_capital().await.unwrap();
    assert!(!reply.success);
    assert_eq!(reply.cooldown, Some(true));
    assert_eq!(reply.cooldown_seconds, Some(5));

    let status = village.status().await.unwrap();
    assert_eq!(status.resource_cooldown, Some(5));
}

#[tokio::test(start_paused = true)]
async fn test_resources_forwarded_through_village() {
    let mesh = Mesh::new(FRONTIER);

    let reply = mesh
        .node("village_3")
        .send_resources_to_capital()
        .await
        .unwrap();
    assert_eq!(reply.path.unwrap().len(), 3);

    wait_secs(6).await;
    // The relay credited them and the source has been paid out
    assert_eq!(mesh.state("village_3").resources, 0);
    assert_eq!(mesh.state("village_2").resources, 70);

    wait_secs(5).await;
    assert_eq!(mesh.state("village_2").resources, 40);
    assert_eq!(mesh.state("capital_a").resources, 130);
}

#[tokio::test(start_paused = true)]
async fn test_captured_resources_not_double_deducted() {
    let mesh = Mesh::new(FRONTIER);

    mesh.node("village_3")
        .send_resources_to_capital()
        .await
        .unwrap();

    // The relay changes hands while the convoy is on its way
    wait_secs(1).await;
    mesh.node("village_2")
        .store()
        .update(&"village_2".into(), |state| {
            state.faction = Faction::Northern;
            Ok(())
        })
        .unwrap();

    wait_secs(15).await;
    assert_eq!(mesh.state("village_3").resources, 0);
    assert_eq!(mesh.state("village_2").resources, 70);
    assert_eq!(mesh.state("capital_a").resources, 100);
}

#[tokio::test(start_paused = true)]
async fn test_send_during_slow_delivery_ships_only_unreserved() {
    let mesh = Mesh::with_transport(FRONTIER, |inner| {
        Arc::new(SlowTransport {
            inner,
            latency: Duration::from_secs(2),
        })
    });
    let village = mesh.node("village_2");

    let reply = village.send_resources_to_capital().await.unwrap();
    assert_eq!(reply.amount, Some(40));

    // Cooldown is over but the first convoy has not been deducted yet
    wait_secs(6).await;
    village
        .store()
        .update(&"village_2".into(), |state| Ok(state.add_resources(10)))
        .unwrap();
    assert_eq!(mesh.state("village_2").resources, 50);

    let reply = village.send_resources_to_capital().await.unwrap();
    assert_eq!(reply.amount, Some(10));

    // Nothing else left to ship while the second is on its way
    wait_secs(6).await;
    assert_eq!(mesh.state("village_2").resources, 10);
    let result = village.send_resources_to_capital().await;
    assert!(matches!(result, Err(WarError::InsufficientResources { .. })));

    wait_secs(3).await;
    assert_eq!(mesh.state("village_2").resources, 0);
    assert_eq!(mesh.state("capital_a").resources, 150);
}

#[tokio::test(start_paused = true)]
async fn test_failed_send_releases_reservation() {
    let mesh = Mesh::new(FRONTIER);
    let village = mesh.node("village_2");

    assert_eq!(village.send_resources_to_capital().await.unwrap().amount, Some(40));
    mesh.transport.set_offline(&"capital_a".into(), true);
    wait_secs(6).await;
    assert_eq!(mesh.state("village_2").resources, 40);

    mesh.transport.set_offline(&"capital_a".into(), false);
    assert_eq!(village.send_resources_to_capital().await.unwrap().amount, Some(40));
    wait_secs(6).await;
    assert_eq!(mesh.state("village_2").resources, 0);
    assert_eq!(mesh.state("capital_a").resources, 140);
}

#[tokio::test(start_paused = true)]
async fn test_collect_cooldown() {
    let mesh = Mesh::new(FRONTIER);
    let capital = mesh.node("capital_a");

    let reply = capital.collect_resources().await.unwrap();
    assert!(reply.success);
    assert_eq!(reply.current_resources, Some(120));

    let reply = capital.collect_resources().await.unwrap();
    assert!(!reply.success);
    assert_eq!(reply.cooldown, Some(true));
    assert_eq!(mesh.state("capital_a").resources, 120);

    wait_secs(5).await;
    assert!(capital.collect_resources().await.unwrap().success);
    assert_eq!(mesh.state("capital_a").resources, 140);

    let result = mesh.node("village_2").collect_resources().await;
    assert!(matches!(result, Err(WarError::WrongLocationKind { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_create_army_costs_resources() {
    let mesh = Mesh::new(FRONTIER);
    let capital = mesh.node("capital_a");

    for _ in 0..3 {
        capital.create_army().await.unwrap();
    }
    assert_eq!(mesh.state("capital_a").army, 8);
    assert_eq!(mesh.state("capital_a").resources, 10);

    let result = capital.create_army().await;
    assert!(matches!(
        result,
        Err(WarError::InsufficientResources { need: 30, have: 10 })
    ));
    assert_eq!(mesh.state("capital_a").army, 8);
}

#[tokio::test(start_paused = true)]
async fn test_move_army_reinforces_friendly_village() {
    let mesh = Mesh::new(FRONTIER);

    let reply = mesh
        .node("capital_a")
        .move_army(MoveArmyRequest {
            target_location: "village_2".into(),
            remaining_path: vec![],
            is_attack_move: false,
        })
        .await
        .unwrap();
    assert_eq!(reply.army_size, Some(5));
    assert_eq!(mesh.state("capital_a").army, 0);

    wait_secs(6).await;
    assert_eq!(mesh.state("village_2").army, 5);
}

#[tokio::test(start_paused = true)]
async fn test_move_army_validation() {
    let mesh = Mesh::new(FRONTIER);
    let capital = mesh.node("capital_a");

    let result = capital
        .move_army(MoveArmyRequest {
            target_location: "capital_b".into(),
            remaining_path: vec![],
            is_attack_move: false,
        })
        .await;
    assert!(matches!(result, Err(WarError::NotConnected { .. })));

    let result = capital
        .move_army(MoveArmyRequest {
            target_location: "village_2".into(),
            remaining_path: vec!["capital_b".into()],
            is_attack_move: true,
        })
        .await;
    assert!(matches!(result, Err(WarError::InvalidTransfer(_))));

    let result = mesh
        .node("village_1")
        .move_army(MoveArmyRequest {
            target_location: "capital_a".into(),
            remaining_path: vec![],
            is_attack_move: false,
        })
        .await;
    assert!(matches!(result, Err(WarError::WrongFaction(Faction::Neutral))));

    assert_eq!(mesh.state("capital_a").army, 5);
    assert_eq!(mesh.state("village_1").army, 2);
}

#[tokio::test(start_paused = true)]
async fn test_attack_move_absorbs_friendly_garrison() {
    let mesh = Mesh::new(FRONTIER);
    mesh.node("village_2")
        .store()
        .update(&"village_2".into(), |state| Ok(state.add_army(3)))
        .unwrap();

    mesh.node("capital_a")
        .move_army(MoveArmyRequest {
            target_location: "village_2".into(),
            remaining_path: vec!["village_3".into()],
            is_attack_move: true,
        })
        .await
        .unwrap();

    wait_secs(11).await;
    assert_eq!(mesh.state("village_2").army, 0);
    assert_eq!(mesh.state("village_3").army, 8);
}

#[tokio::test(start_paused = true)]
async fn test_failed_first_hop_restores_attack_army() {
    let mesh = Mesh::new(FRONTIER);

    mesh.node("capital_a").all_out_attack().await.unwrap();
    mesh.transport.set_offline(&"village_1".into(), true);

    wait_secs(6).await;
    assert_eq!(mesh.state("capital_a").army, 5);

    let status = mesh.node("capital_a").status().await.unwrap();
    assert_eq!(status.transfers.lost, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_move_loses_army() {
    let mesh = Mesh::new(FRONTIER);
    mesh.transport.set_offline(&"village_2".into(), true);

    mesh.node("capital_a")
        .move_army(MoveArmyRequest {
            target_location: "village_2".into(),
            remaining_path: vec![],
            is_attack_move: false,
        })
        .await
        .unwrap();

    wait_secs(6).await;
    assert_eq!(mesh.state("capital_a").army, 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_path_when_enemy_capital_unobserved() {
    let mesh = Mesh::new(FRONTIER);
    mesh.transport.set_offline(&"capital_b".into(), true);

    let result = mesh.node("capital_a").all_out_attack().await;
    assert!(matches!(result, Err(WarError::NoPath { .. })));
    assert_eq!(mesh.state("capital_a").army, 5);
}

#[tokio::test(start_paused = true)]
async fn test_reset_restores_defaults() {
    let mesh = Mesh::new(FRONTIER);
    let capital = mesh.node("capital_a");

    capital.create_army().await.unwrap();
    capital.collect_resources().await.unwrap();

    capital.reset(false).await.unwrap();
    let first = mesh.state("capital_a");
    capital.reset(false).await.unwrap();

    assert_eq!(first, mesh.state("capital_a"));
    assert_eq!(first.resources, 100);
    assert_eq!(first.army, 5);
    // Cooldowns are cleared too
    assert!(capital.collect_resources().await.unwrap().success);
}

#[tokio::test(start_paused = true)]
async fn test_reset_reaches_every_location() {
    let mesh = Mesh::new(FRONTIER);
    mesh.set_state("village_1", Faction::Northern, 9);
    mesh.set_state("capital_b", Faction::Southern, 0);

    let reply = mesh.node("capital_a").reset(true).await.unwrap();
    assert!(reply.success);

    let village = mesh.state("village_1");
    assert_eq!((village.faction, village.army), (Faction::Neutral, 2));
    let capital = mesh.state("capital_b");
    assert_eq!((capital.faction, capital.army), (Faction::Northern, 1));
}

#[tokio::test(start_paused = true)]
async fn test_reset_reports_unreachable_peers() {
    let mesh = Mesh::new(FRONTIER);
    mesh.set_state("village_1", Faction::Northern, 9);
    mesh.set_state("village_3", Faction::Northern, 9);
    mesh.transport.set_offline(&"village_3".into(), true);

    let reply = mesh.node("capital_a").reset(true).await.unwrap();
    assert!(!reply.success);
    assert!(reply.message.contains("village_3"));

    assert_eq!(mesh.state("village_1").faction, Faction::Neutral);
    assert_eq!(mesh.state("village_3").faction, Faction::Northern);
}

#[tokio::test(start_paused = true)]
async fn test_converging_armies_resolve_in_sequence() {
    let mesh = Mesh::new(FRONTIER);
    mesh.set_state("village_1", Faction::Southern, 2);
    mesh.set_state("capital_a", Faction::Southern, 3);
    mesh.set_state("capital_b", Faction::Northern, 4);

    // Both leave in the same tick, so both land in the same tick
    mesh.node("capital_a").move_army(march("village_1")).await.unwrap();
    mesh.node("capital_b").move_army(march("village_1")).await.unwrap();
    wait_secs(6).await;

    let in_sequence = |first: (u32, Faction), second: (u32, Faction)| {
        let after = resolve_battle(first.0, first.1, 2, Faction::Southern);
        let last = resolve_battle(second.0, second.1, after.remaining_army, after.owner);
        (last.remaining_army, last.owner)
    };
    let friendly = (3, Faction::Southern);
    let hostile = (4, Faction::Northern);
    let expected = [
        in_sequence(friendly, hostile),
        in_sequence(hostile, friendly),
    ];

    let village = mesh.state("village_1");
    assert!(
        expected.contains(&(village.army, village.faction)),
        "{:?} not in {:?}",
        (village.army, village.faction),
        expected
    );
    assert_eq!(mesh.state("capital_a").army, 0);
    assert_eq!(mesh.state("capital_b").army, 0);
}

#[tokio::test(start_paused = true)]
async fn test_passive_generation_until_shutdown() {
    let mesh = Mesh::new(FRONTIER);
    let village = mesh.node("village_2");

    assert!(mesh.node("capital_a").spawn_passive_generation().is_none());
    let task = village.spawn_passive_generation().unwrap();

    wait_secs(31).await;
    assert_eq!(mesh.state("village_2").resources, 60);

    mesh.shutdown.trigger();
    task.await.unwrap();

    let result = mesh.node("capital_a").all_out_attack().await;
    assert!(matches!(result, Err(WarError::ShuttingDown)));
    assert_eq!(mesh.state("capital_a").army, 5);
}
