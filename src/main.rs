//! Location node
//!
//! Runs one location of the world as an HTTP service. Peers are addressed by
//! the `host:port` in the world file unless overridden.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use war_of_kingdoms::core::error::{Result, WarError};
use war_of_kingdoms::core::types::LocationId;
use war_of_kingdoms::node::{self, NodeService};
use war_of_kingdoms::transfer::{HttpTransport, Shutdown};
use war_of_kingdoms::world::{load_world, LoadedWorld, LocationStore};

/// War of Kingdoms location node
#[derive(Parser, Debug)]
#[command(name = "location_node")]
#[command(about = "Run one location of the world as an HTTP node")]
struct Args {
    /// Location this node runs (e.g. southern_capital)
    #[arg(long)]
    location: String,

    /// World definition; the built-in standard world is used if the file is missing
    #[arg(long, default_value = "data/world.toml")]
    world: PathBuf,

    /// Persist state to this JSON file and reload it on start
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Listen address (defaults to 0.0.0.0 on the location's port)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Address peers by service name (village_1 -> village-1)
    #[arg(long)]
    service_hostnames: bool,

    /// Override one peer's base URL, as ID=URL (repeatable)
    #[arg(long = "host-override", value_parser = parse_override)]
    host_overrides: Vec<(LocationId, String)>,
}

fn parse_override(raw: &str) -> std::result::Result<(LocationId, String), String> {
    let (id, url) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=URL, got '{}'", raw))?;
    Ok((LocationId::from(id), url.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("war_of_kingdoms=info,location_node=info")
            }),
        )
        .init();

    let args = Args::parse();

    let LoadedWorld { graph, config } = if args.world.exists() {
        load_world(&args.world)?
    } else {
        tracing::warn!("{} not found, using the standard world", args.world.display());
        LoadedWorld::standard()
    };
    config.validate().map_err(WarError::Config)?;
    let graph = Arc::new(graph);

    let id = LocationId::new(args.location);
    let location = graph.get(&id)?.clone();

    let store = match &args.state_file {
        Some(path) => LocationStore::open(path, &graph)?,
        None => LocationStore::in_memory(&graph),
    };

    let mut transport = HttpTransport::new(&graph, config.request_timeout())?;
    if args.service_hostnames {
        transport = transport.with_service_hostnames(&graph);
    }
    for (peer, url) in args.host_overrides {
        transport = transport.with_address(peer, url);
    }

    let shutdown = Shutdown::new();
    let node = NodeService::new(
        &id,
        Arc::clone(&graph),
        config,
        Arc::new(store),
        transport.into_shared(),
        shutdown.signal(),
    )?;
    let passive = node.spawn_passive_generation();

    let bind = args
        .bind
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], location.port)));
    let listener = TcpListener::bind(bind).await?;

    tracing::info!(
        "Starting {} ({}, {})",
        location.name,
        location.kind,
        location.faction
    );

    let server = tokio::spawn(node::serve(node, listener, shutdown.signal()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down {}", location.name);
    shutdown.trigger();

    match server.await {
        Ok(result) => result?,
        Err(e) => tracing::error!("Server task failed: {}", e),
    }
    if let Some(passive) = passive {
        let _ = passive.await;
    }
    Ok(())
}
