//! The monitor control loop.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use warden_consensus::{LeadershipState, LeadershipWatch};
use warden_failover::{ActionExecutor, FailoverAction, FailoverEngine};
use warden_health::{HealthConfig, Probe, ProbeCycle};
use warden_registry::{
    node_address, MembershipSnapshot, MembershipWatcher, NodeId, Registry, RegistryResult,
};

use crate::status::{ClusterStatus, MonitorStatus, NodeStatus, StatusHandle};

/// Callback invoked after a failover action has been executed, e.g. to
/// journal it through the consensus layer. Returns nothing; failures
/// are the callee's to log.
pub type JournalCallback = Arc<dyn Fn(FailoverAction) -> BoxFuture + Send + Sync>;

type BoxFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

/// Top-level monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Registry root; clusters live under `{root}/cache_list`.
    pub registry_root: String,
    /// Cluster-id filter pattern.
    pub cluster_pattern: String,
    /// Probe cadence and bounds.
    pub health: HealthConfig,
    /// Failover cooldown window in seconds.
    pub cooldown_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            registry_root: "/warden".to_string(),
            cluster_pattern: ".*".to_string(),
            health: HealthConfig::default(),
            cooldown_secs: 300,
        }
    }
}

struct WatcherTask {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Wires leadership, membership, probing, and failover together.
pub struct Orchestrator {
    config: MonitorConfig,
    leadership: LeadershipWatch,
    watcher: Arc<MembershipWatcher>,
    snapshot_rx: watch::Receiver<Arc<MembershipSnapshot>>,
    cycle: ProbeCycle,
    engine: FailoverEngine,
    executor: Arc<dyn ActionExecutor>,
    journal: Option<JournalCallback>,
    status_tx: watch::Sender<MonitorStatus>,
    /// Health observed by the most recent acted-upon cycle.
    last_health: BTreeMap<NodeId, bool>,
    watcher_task: Option<WatcherTask>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<dyn Registry>,
        leadership: LeadershipWatch,
        config: MonitorConfig,
        probe: Arc<dyn Probe>,
        executor: Arc<dyn ActionExecutor>,
    ) -> RegistryResult<Self> {
        let watcher = Arc::new(MembershipWatcher::new(
            registry,
            &config.registry_root,
            &config.cluster_pattern,
        )?);
        let snapshot_rx = watcher.subscribe();
        let cycle = ProbeCycle::new(probe, &config.health);
        let engine = FailoverEngine::new(config.cooldown_secs);
        let (status_tx, _) = watch::channel(MonitorStatus::default());

        Ok(Self {
            config,
            leadership,
            watcher,
            snapshot_rx,
            cycle,
            engine,
            executor,
            journal: None,
            status_tx,
            last_health: BTreeMap::new(),
            watcher_task: None,
        })
    }

    /// Set a callback invoked for each executed failover action.
    pub fn with_journal(mut self, journal: JournalCallback) -> Self {
        self.journal = Some(journal);
        self
    }

    /// A status reader; obtain before calling [`Orchestrator::run`].
    pub fn status(&self) -> StatusHandle {
        StatusHandle::new(self.status_tx.subscribe())
    }

    /// Drive the monitor until shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut leadership = self.leadership.clone();
        let mut ticker = tokio::time::interval(self.config.health.probe_interval);
        // A slow cycle defers the next tick; it is never skipped or
        // run concurrently.
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        self.apply_role(leadership.latest());

        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_cycle().await,
                changed = leadership.changed() => match changed {
                    Ok(()) => {
                        let state = leadership.latest();
                        self.apply_role(state);
                    }
                    Err(_) => {
                        warn!("leadership feed closed, orchestrator stopping");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    info!("orchestrator shutting down");
                    break;
                }
            }
        }

        self.stop_watcher();
    }

    /// React to a role or term transition.
    fn apply_role(&mut self, state: LeadershipState) {
        let was_active = self.watcher_task.is_some();

        if state.is_leader() && !was_active {
            info!(term = state.term, "became leader, starting monitoring");
            // Health history derived under a previous term must not
            // inform this term's transitions. The cooldown window and
            // counters survive.
            self.engine.reset_observations();
            self.last_health.clear();
            self.start_watcher();
        } else if !state.is_leader() && was_active {
            info!(role = ?state.role, term = state.term, "lost leadership, going inert");
            self.stop_watcher();
        }

        self.publish_status(state);
    }

    /// Run one probe cycle, if this replica is leader.
    async fn run_cycle(&mut self) {
        let started = self.leadership.current();
        if !started.is_leader() {
            return;
        }

        // Point-in-time copy: a registry change landing mid-cycle
        // affects only the next cycle.
        let snapshot = self.snapshot_rx.borrow().clone();
        debug!(nodes = snapshot.len(), term = started.term, "probe cycle starting");

        let outcomes = self.cycle.run(&snapshot).await;

        // The cycle drained; re-check before acting on its outcomes.
        let current = self.leadership.current();
        if current != started {
            info!(
                started_term = started.term,
                current_term = current.term,
                "leadership changed mid-cycle, discarding outcomes"
            );
            return;
        }

        self.last_health = outcomes
            .iter()
            .map(|o| (o.node.clone(), o.healthy))
            .collect();

        let now = epoch_secs();
        let actions = self.engine.evaluate(&outcomes, now);

        for action in actions {
            // Final re-check immediately before the externally-visible
            // effect. A stale leader drops the action; the next leader
            // re-derives its own decision from fresh probes.
            let state = self.leadership.current();
            if state != started {
                info!(node = %action.node, "leadership lost before execution, dropping failover action");
                continue;
            }

            if let Err(e) = self.executor.execute(&action).await {
                warn!(node = %action.node, error = %e, "failover executor failed");
            }
            if let Some(journal) = &self.journal {
                journal(action.clone()).await;
            }
        }

        self.publish_status(current);
    }

    fn start_watcher(&mut self) {
        if self.watcher_task.is_some() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watcher = Arc::clone(&self.watcher);
        let handle = tokio::spawn(async move { watcher.run(shutdown_rx).await });
        self.watcher_task = Some(WatcherTask {
            handle,
            shutdown_tx,
        });
        info!("membership watcher started");
    }

    fn stop_watcher(&mut self) {
        if let Some(task) = self.watcher_task.take() {
            let _ = task.shutdown_tx.send(true);
            task.handle.abort();
            info!("membership watcher stopped");
        }
    }

    fn publish_status(&self, leadership: LeadershipState) {
        let snapshot = self.snapshot_rx.borrow().clone();
        let cooldown = self.engine.cooldown();
        let now = epoch_secs();

        let clusters = snapshot
            .clusters()
            .into_iter()
            .map(|cluster| ClusterStatus {
                id: cluster.to_string(),
                nodes: snapshot
                    .nodes_in(cluster)
                    .into_iter()
                    .map(|node| NodeStatus {
                        id: node.to_string(),
                        address: node_address(node).to_string(),
                        active: self.last_health.get(node).copied().unwrap_or(true),
                    })
                    .collect(),
            })
            .collect();

        self.status_tx.send_replace(MonitorStatus {
            role: leadership.role,
            term: leadership.term,
            clusters,
            failover_count: cooldown.failover_count,
            cooldown_active: cooldown.cooling_down(now),
            cooldown_remaining_secs: cooldown.remaining_secs(now),
            suppressed_candidates: self.engine.suppressed_candidates(),
        });
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
