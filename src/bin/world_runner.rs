//! World Runner
//!
//! Starts every location of a world as an HTTP node inside one process.
//! Handy for playing locally without launching eight separate binaries.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use war_of_kingdoms::core::error::{Result, WarError};
use war_of_kingdoms::node::{self, NodeService};
use war_of_kingdoms::transfer::{HttpTransport, LocalTransport, PeerTransport, Shutdown};
use war_of_kingdoms::world::{load_world, LoadedWorld, LocationStore};

/// Run a whole world in one process
#[derive(Parser, Debug)]
#[command(name = "world_runner")]
#[command(about = "Start every location of the world as an HTTP node")]
struct Args {
    /// World definition; the built-in standard world is used if the file is missing
    #[arg(long, default_value = "data/world.toml")]
    world: PathBuf,

    /// Keep one JSON state file per location in this directory
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Route peer calls in memory instead of over HTTP
    #[arg(long)]
    in_process: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("war_of_kingdoms=info,world_runner=info")
            }),
        )
        .init();

    let args = Args::parse();

    let LoadedWorld { graph, config } = if args.world.exists() {
        load_world(&args.world)?
    } else {
        LoadedWorld::standard()
    };
    config.validate().map_err(WarError::Config)?;
    let graph = Arc::new(graph);

    if let Some(dir) = &args.state_dir {
        std::fs::create_dir_all(dir)?;
    }

    let local = LocalTransport::new();
    let transport: Arc<dyn PeerTransport> = if args.in_process {
        local.clone()
    } else {
        HttpTransport::new(&graph, config.request_timeout())?.into_shared()
    };

    let shutdown = Shutdown::new();
    let mut tasks = JoinSet::new();

    for location in graph.locations() {
        let store = match &args.state_dir {
            Some(dir) => {
                LocationStore::open(dir.join(format!("{}.json", location.id)), &graph)?
            }
            None => LocationStore::in_memory(&graph),
        };

        let node = NodeService::new(
            &location.id,
            Arc::clone(&graph),
            config.clone(),
            Arc::new(store),
            Arc::clone(&transport),
            shutdown.signal(),
        )?;
        local.register(&node);

        if let Some(passive) = node.spawn_passive_generation() {
            tasks.spawn(async move {
                let _ = passive.await;
                Ok::<(), WarError>(())
            });
        }

        let listener = TcpListener::bind(("0.0.0.0", location.port)).await?;
        tasks.spawn(node::serve(node, listener, shutdown.signal()));
    }

    tracing::info!("{} locations running, press Ctrl-C to stop", graph.len());
    tokio::signal::ctrl_c().await?;
    shutdown.trigger();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Err(e)) => tracing::error!("Node stopped with error: {}", e),
            Err(e) => tracing::error!("Node task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }
    Ok(())
}
