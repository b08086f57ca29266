//! Consensus node assembly.
//!
//! Builds the raft instance for this replica, bootstraps the fixed
//! ensemble, and relays raft metrics into the leadership channel the
//! rest of the monitor consumes. The relay is the only writer of
//! leadership state in the process.

use std::sync::Arc;

use openraft::{BasicNode, RaftMetrics, ServerState};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::ensemble::Ensemble;
use crate::error::{ConsensusError, ConsensusResult};
use crate::log_store::LogStore;
use crate::network::NetworkFactory;
use crate::proto::raft_service_server::RaftServiceServer;
use crate::role::{leadership_channel, LeadershipPublisher, LeadershipState, LeadershipWatch, Role};
use crate::server::ConsensusServer;
use crate::state_machine::{FailoverRecord, StateMachine};
use crate::typ::{Request, WardenRaft};

/// One monitor replica's membership in the consensus ensemble.
pub struct ConsensusNode {
    raft: Arc<WardenRaft>,
    state_machine: StateMachine,
    leadership: LeadershipWatch,
    ensemble: Ensemble,
    raft_id: u64,
}

impl ConsensusNode {
    /// Create the raft instance for `node_name` and bootstrap the
    /// ensemble. `node_name` must be one of the ensemble members.
    pub async fn start(node_name: &str, ensemble: Ensemble) -> ConsensusResult<Self> {
        let raft_id = ensemble
            .raft_id(node_name)
            .ok_or_else(|| ConsensusError::UnknownMember(node_name.to_string()))?;

        let config = Arc::new(openraft::Config {
            heartbeat_interval: 500,
            election_timeout_min: 1500,
            election_timeout_max: 3000,
            ..Default::default()
        });

        let state_machine = StateMachine::new();
        let raft = WardenRaft::new(
            raft_id,
            config,
            NetworkFactory,
            LogStore::new(),
            state_machine.clone(),
        )
        .await
        .map_err(|e| ConsensusError::Raft(e.to_string()))?;
        let raft = Arc::new(raft);
        info!(%node_name, raft_id, members = ensemble.len(), "raft instance created");

        // Bootstrap the fixed member set. "Not allowed" here means the
        // ensemble is already initialized, expected on rejoin.
        if let Err(e) = raft.initialize(ensemble.raft_members()).await {
            info!(error = %e, "raft initialize skipped (ensemble may already be bootstrapped)");
        }

        let (publisher, leadership) = leadership_channel(LeadershipState::unknown());
        tokio::spawn(relay_metrics(raft.metrics(), publisher));

        Ok(Self {
            raft,
            state_machine,
            leadership,
            ensemble,
            raft_id,
        })
    }

    /// A reader of this replica's leadership state.
    pub fn leadership(&self) -> LeadershipWatch {
        self.leadership.clone()
    }

    pub fn raft_id(&self) -> u64 {
        self.raft_id
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    /// The raft gRPC service for mounting on this replica's server.
    pub fn grpc_service(&self) -> RaftServiceServer<ConsensusServer> {
        ConsensusServer::new(Arc::clone(&self.raft)).into_service()
    }

    /// Replicate one emitted failover action to the ensemble journal.
    ///
    /// Best-effort: callers log failures and move on; the action itself
    /// has already been taken.
    pub async fn record_failover(&self, node: &str, cluster: &str, at: u64) -> ConsensusResult<()> {
        self.raft
            .client_write(Request::RecordFailover {
                node: node.to_string(),
                cluster: cluster.to_string(),
                at,
            })
            .await
            .map(|_| ())
            .map_err(|e| ConsensusError::Raft(e.to_string()))
    }

    /// The replicated failover journal, oldest first.
    pub fn journal(&self) -> Vec<FailoverRecord> {
        self.state_machine.journal()
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.raft.shutdown().await {
            warn!(error = %e, "raft shutdown error");
        }
    }
}

fn role_of(metrics: &RaftMetrics<u64, BasicNode>) -> Role {
    match metrics.state {
        ServerState::Leader => Role::Leader,
        // A replica that knows the leader is a settled follower; one
        // that does not is still electing.
        ServerState::Follower | ServerState::Candidate | ServerState::Learner => {
            if metrics.current_leader.is_some() {
                Role::Follower
            } else {
                Role::Unknown
            }
        }
        _ => Role::Unknown,
    }
}

async fn relay_metrics(
    mut metrics: watch::Receiver<RaftMetrics<u64, BasicNode>>,
    publisher: LeadershipPublisher,
) {
    loop {
        let state = {
            let m = metrics.borrow_and_update();
            LeadershipState {
                role: role_of(&m),
                term: m.current_term,
            }
        };
        publisher.publish(state);

        if metrics.changed().await.is_err() {
            debug!("raft metrics channel closed, leadership relay stopping");
            return;
        }
    }
}
