//! Operator-facing status reads.
//!
//! The interactive shell (an external collaborator) inspects the
//! monitor through [`StatusHandle`]: a watch channel carrying a
//! complete [`MonitorStatus`] value, republished by the orchestrator
//! after role transitions and probe cycles. Reads clone the current
//! value out of the channel — no locks held, no registry round-trips.

use tokio::sync::watch;

use warden_consensus::{LeadershipState, Role};
use warden_registry::{ClusterId, NodeId};

/// One registered node as seen by the last probe cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub id: NodeId,
    /// Dialable `ip:port` derived from the node id.
    pub address: String,
    /// False once a probe cycle has observed the node unhealthy. Nodes
    /// not yet probed count as active: registration implies liveness
    /// until a probe says otherwise.
    pub active: bool,
}

/// One monitored cluster with its member nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterStatus {
    pub id: ClusterId,
    pub nodes: Vec<NodeStatus>,
}

/// Complete point-in-time monitor status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorStatus {
    pub role: Role,
    pub term: u64,
    pub clusters: Vec<ClusterStatus>,
    pub failover_count: u64,
    pub cooldown_active: bool,
    pub cooldown_remaining_secs: u64,
    pub suppressed_candidates: u64,
}

impl Default for MonitorStatus {
    fn default() -> Self {
        Self {
            role: Role::Unknown,
            term: 0,
            clusters: Vec::new(),
            failover_count: 0,
            cooldown_active: false,
            cooldown_remaining_secs: 0,
            suppressed_candidates: 0,
        }
    }
}

impl MonitorStatus {
    pub fn leadership(&self) -> LeadershipState {
        LeadershipState {
            role: self.role,
            term: self.term,
        }
    }
}

/// Read side of the status channel. Cheap to clone.
#[derive(Clone)]
pub struct StatusHandle {
    rx: watch::Receiver<MonitorStatus>,
}

impl StatusHandle {
    pub(crate) fn new(rx: watch::Receiver<MonitorStatus>) -> Self {
        Self { rx }
    }

    /// The latest published status.
    pub fn current(&self) -> MonitorStatus {
        self.rx.borrow().clone()
    }

    /// Currently registered cluster identifiers.
    pub fn clusters(&self) -> Vec<ClusterId> {
        self.rx.borrow().clusters.iter().map(|c| c.id.clone()).collect()
    }

    /// Member nodes of one cluster; empty when unknown.
    pub fn nodes(&self, cluster: &str) -> Vec<NodeStatus> {
        self.rx
            .borrow()
            .clusters
            .iter()
            .find(|c| c.id == cluster)
            .map(|c| c.nodes.clone())
            .unwrap_or_default()
    }

    /// Wait for the next status publication.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }
}
