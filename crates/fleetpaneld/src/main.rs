//! fleetpaneld — the fleet panel daemon.
//!
//! Single binary that assembles the panel's subsystems:
//! - Node inventory (redb)
//! - Telemetry poller
//! - Admin dashboard API + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! fleetpaneld --config /etc/fleetpanel/panel.toml serve --port 8443
//! fleetpaneld --config panel.toml poll-once
//! fleetpaneld --config panel.toml check --node 1 --memory 1024 --disk 4096
//! ```

mod seed;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fleetpanel_core::PanelConfig;
use fleetpanel_placement::{headroom, is_viable};
use fleetpanel_state::{NodeId, StateStore};
use fleetpanel_telemetry::{
    ClientOptions, FleetPoller, RecordCredentials, SnapshotStore, TelemetryClient, project,
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleetpaneld", about = "Fleet panel daemon")]
struct Cli {
    /// Path to panel.toml. Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the node inventory.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the poller and the admin API until interrupted.
    Serve {
        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Time between poll cycles, e.g. "30s".
        #[arg(long)]
        poll_interval: Option<String>,
    },
    /// Run a single poll cycle and print the dashboard view as JSON.
    PollOnce,
    /// Check whether a node can take a workload of the given size.
    Check {
        #[arg(long)]
        node: NodeId,

        /// Requested memory in MB.
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        memory: i64,

        /// Requested disk in MB.
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        disk: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = match &cli.config {
        Some(path) => PanelConfig::from_file(path)?,
        None => PanelConfig::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.server.data_dir = data_dir;
    }

    match cli.command {
        Command::Serve {
            port,
            poll_interval,
        } => {
            if let Some(port) = port {
                config.server.listen_port = port;
            }
            if let Some(interval) = poll_interval {
                config.poller.interval = interval;
            }
            config.validate()?;
            run_serve(config).await
        }
        Command::PollOnce => run_poll_once(config).await,
        Command::Check { node, memory, disk } => run_check(config, node, memory, disk),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fleetpaneld=debug,fleetpanel_telemetry=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Open the inventory under the data dir and upsert the configured seeds.
fn open_store(config: &PanelConfig) -> anyhow::Result<StateStore> {
    let data_dir = &config.server.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db_path = data_dir.join("fleetpanel.redb");

    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "node inventory opened");

    let summary = seed::seed_inventory(&store, config)?;
    info!(
        nodes = summary.nodes,
        allocations = summary.allocations,
        "inventory seeded from config"
    );
    Ok(store)
}

fn build_poller(
    config: &PanelConfig,
    store: StateStore,
) -> anyhow::Result<FleetPoller<TelemetryClient>> {
    let options = ClientOptions::from_config(&config.poller)?;
    let client = TelemetryClient::new(options, RecordCredentials)?;
    let poller = FleetPoller::new(store, client, SnapshotStore::new(), config.poller.interval()?)
        .with_max_concurrency(config.poller.max_concurrency);
    Ok(poller)
}

async fn run_serve(config: PanelConfig) -> anyhow::Result<()> {
    info!("fleet panel daemon starting");

    let store = open_store(&config)?;
    let poller = build_poller(&config, store.clone())?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let poller_handle = tokio::spawn(poller.clone().run(shutdown_rx));

    // ── Start API server ───────────────────────────────────────

    let router = fleetpanel_api::build_router(store, poller);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.listen_port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = poller_handle.await;

    info!("fleet panel daemon stopped");
    Ok(())
}

async fn run_poll_once(config: PanelConfig) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let nodes = store.list_nodes()?;
    let poller = build_poller(&config, store)?;

    let report = poller.poll_all(nodes).await;
    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        "poll cycle finished"
    );

    println!("{}", serde_json::to_string_pretty(&project(&report.snapshot))?);
    Ok(())
}

fn run_check(config: PanelConfig, node_id: NodeId, memory: i64, disk: i64) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let node = store
        .get_node(node_id)?
        .with_context(|| format!("node {node_id} not found"))?;

    let viable = is_viable(&node, memory, disk)?;
    let remaining = headroom(&node)?;

    let out = serde_json::json!({
        "node_id": node_id,
        "name": node.name,
        "requested": { "memory_mb": memory, "disk_mb": disk },
        "committed": { "memory_mb": node.sum_memory_mb, "disk_mb": node.sum_disk_mb },
        "headroom": remaining,
        "viable": viable,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
