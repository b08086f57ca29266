//! Probe trait and outcomes.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use warden_registry::{ClusterId, NodeId};

/// Why a probe did not pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    #[error("probe timed out")]
    Timeout,

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result of probing one node in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub node: NodeId,
    pub cluster: ClusterId,
    pub healthy: bool,
    /// Observation time, unix epoch seconds.
    pub observed_at: u64,
    pub cause: Option<ProbeFailure>,
}

impl ProbeOutcome {
    pub fn pass(node: NodeId, cluster: ClusterId, observed_at: u64) -> Self {
        Self {
            node,
            cluster,
            healthy: true,
            observed_at,
            cause: None,
        }
    }

    pub fn fail(node: NodeId, cluster: ClusterId, observed_at: u64, cause: ProbeFailure) -> Self {
        Self {
            node,
            cluster,
            healthy: false,
            observed_at,
            cause: Some(cause),
        }
    }
}

/// A single liveness check against one node address.
///
/// Implementations must not enforce their own deadline; the cycle wraps
/// every probe in the configured timeout.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, address: &str) -> Result<(), ProbeFailure>;
}

/// TCP-connect liveness probe.
///
/// Reachability of the cache port is the liveness signal; whatever wire
/// protocol the node speaks stays out of scope.
pub struct TcpProbe;

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, address: &str) -> Result<(), ProbeFailure> {
        match tokio::net::TcpStream::connect(address).await {
            Ok(_stream) => Ok(()),
            Err(e) => {
                debug!(%address, error = %e, "probe connection failed");
                Err(ProbeFailure::Connect(e.to_string()))
            }
        }
    }
}
