//! wardend — the CacheWarden daemon.
//!
//! One replica of the cache-cluster health monitor:
//! - Raft consensus over the monitor ensemble (leader-only monitoring)
//! - Registry-driven cluster membership reconciliation
//! - Concurrent liveness probes with cooldown-gated failover
//!
//! # Usage
//!
//! ```text
//! wardend run \
//!     --node-id m1 \
//!     --ensemble m1=10.0.0.1:7101,m2=10.0.0.2:7101,m3=10.0.0.3:7101 \
//!     --registry /etc/warden/clusters.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use warden_consensus::{ConsensusNode, Ensemble};
use warden_failover::{ActionExecutor, LogExecutor};
use warden_health::{HealthConfig, Probe, TcpProbe};
use warden_monitor::{MonitorConfig, Orchestrator};
use warden_registry::{FileRegistry, Registry};

#[derive(Parser)]
#[command(name = "wardend", about = "CacheWarden daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one monitor replica.
    Run {
        /// This replica's name in the ensemble.
        #[arg(long)]
        node_id: String,

        /// Ensemble members as name=host:port, comma separated.
        #[arg(long)]
        ensemble: String,

        /// Replace one member's address (name=host:port), for rejoining
        /// under a new address.
        #[arg(long)]
        overwrite_peer: Option<String>,

        /// Path to the registry file listing clusters and their nodes.
        #[arg(long)]
        registry: PathBuf,

        /// Registry root path.
        #[arg(long, default_value = "/warden")]
        registry_root: String,

        /// Cluster-id filter pattern (regex).
        #[arg(long, default_value = ".*")]
        pattern: String,

        /// Seconds between probe cycles.
        #[arg(long, default_value = "10")]
        probe_interval_secs: u64,

        /// Per-probe timeout in milliseconds.
        #[arg(long, default_value = "2000")]
        probe_timeout_ms: u64,

        /// Cap on concurrently in-flight probes.
        #[arg(long, default_value = "64")]
        max_concurrent_probes: usize,

        /// Failover cooldown window in seconds.
        #[arg(long, default_value = "300")]
        cooldown_secs: u64,

        /// Seconds between registry file polls.
        #[arg(long, default_value = "5")]
        registry_poll_secs: u64,

        /// Seconds between status log lines.
        #[arg(long, default_value = "60")]
        status_interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wardend=debug,warden=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            node_id,
            ensemble,
            overwrite_peer,
            registry,
            registry_root,
            pattern,
            probe_interval_secs,
            probe_timeout_ms,
            max_concurrent_probes,
            cooldown_secs,
            registry_poll_secs,
            status_interval_secs,
        } => {
            let config = MonitorConfig {
                registry_root,
                cluster_pattern: pattern,
                health: HealthConfig {
                    probe_interval: Duration::from_secs(probe_interval_secs),
                    probe_timeout: Duration::from_millis(probe_timeout_ms),
                    max_concurrent_probes,
                },
                cooldown_secs,
            };
            run_monitor(
                node_id,
                ensemble,
                overwrite_peer,
                registry,
                config,
                Duration::from_secs(registry_poll_secs),
                Duration::from_secs(status_interval_secs),
            )
            .await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_monitor(
    node_id: String,
    ensemble_spec: String,
    overwrite_peer: Option<String>,
    registry_path: PathBuf,
    config: MonitorConfig,
    registry_poll: Duration,
    status_interval: Duration,
) -> anyhow::Result<()> {
    info!("CacheWarden daemon starting");

    // ── Configuration (fatal before any coordination begins) ──────
    let mut ensemble = Ensemble::parse(&ensemble_spec)?;
    if let Some(spec) = overwrite_peer {
        ensemble.overwrite_peer(&spec)?;
    }
    let listen: SocketAddr = ensemble
        .address_of(&node_id)
        .ok_or_else(|| anyhow::anyhow!("--node-id {node_id} is not an ensemble member"))?
        .parse()?;

    let registry = Arc::new(FileRegistry::open(&registry_path, &config.registry_root)?);
    info!(path = %registry_path.display(), "registry opened");

    // ── Consensus ─────────────────────────────────────────────────
    let consensus = Arc::new(ConsensusNode::start(&node_id, ensemble).await?);
    info!(raft_id = consensus.raft_id(), %listen, "consensus node started");

    let raft_service = consensus.grpc_service();
    let grpc_handle = tokio::spawn(async move {
        if let Err(e) = tonic::transport::Server::builder()
            .add_service(raft_service)
            .serve(listen)
            .await
        {
            tracing::error!(error = %e, "raft gRPC server error");
        }
    });

    // ── Orchestrator ──────────────────────────────────────────────
    let journal_consensus = Arc::clone(&consensus);
    let orchestrator = Orchestrator::new(
        Arc::clone(&registry) as Arc<dyn Registry>,
        consensus.leadership(),
        config,
        Arc::new(TcpProbe) as Arc<dyn Probe>,
        Arc::new(LogExecutor) as Arc<dyn ActionExecutor>,
    )?
    .with_journal(Arc::new(move |action| {
        let consensus = Arc::clone(&journal_consensus);
        Box::pin(async move {
            if let Err(e) = consensus
                .record_failover(&action.node, &action.cluster, action.at)
                .await
            {
                tracing::warn!(error = %e, "failed to journal failover action");
            }
        })
    }));
    let status = orchestrator.status();
    info!("orchestrator initialized");

    // ── Background tasks ──────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poll_registry = Arc::clone(&registry);
    let poll_shutdown = shutdown_rx.clone();
    let poll_handle = tokio::spawn(async move {
        poll_registry.poll(registry_poll, poll_shutdown).await;
    });

    let orchestrator_shutdown = shutdown_rx.clone();
    let orchestrator_handle = tokio::spawn(async move {
        orchestrator.run(orchestrator_shutdown).await;
    });

    // Periodic status summary for operators tailing the log.
    let status_shutdown = shutdown_rx.clone();
    let status_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(status_interval);
        let mut shutdown = status_shutdown;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let s = status.current();
                    info!(
                        role = ?s.role,
                        term = s.term,
                        clusters = s.clusters.len(),
                        nodes = s.clusters.iter().map(|c| c.nodes.len()).sum::<usize>(),
                        failover_count = s.failover_count,
                        cooldown_active = s.cooldown_active,
                        suppressed = s.suppressed_candidates,
                        "monitor status"
                    );
                }
                _ = shutdown.changed() => break,
            }
        }
    });

    // ── Graceful shutdown on Ctrl-C ───────────────────────────────
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = orchestrator_handle.await;
    let _ = poll_handle.await;
    let _ = status_handle.await;
    grpc_handle.abort();
    consensus.shutdown().await;

    info!("CacheWarden daemon stopped");
    Ok(())
}
