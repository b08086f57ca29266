//! Failover action execution boundary.
//!
//! What a failover actually does to a cache cluster is an external
//! concern; the monitor only decides *when*. Executor failures are the
//! caller's to log — they never unwind an already-emitted action.

use async_trait::async_trait;
use tracing::info;

use crate::engine::FailoverAction;

/// Executes emitted failover actions.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &FailoverAction) -> anyhow::Result<()>;
}

/// Executor that records the action and does nothing else.
pub struct LogExecutor;

#[async_trait]
impl ActionExecutor for LogExecutor {
    async fn execute(&self, action: &FailoverAction) -> anyhow::Result<()> {
        info!(
            node = %action.node,
            cluster = %action.cluster,
            cause = ?action.cause,
            at = action.at,
            "failover action"
        );
        Ok(())
    }
}
