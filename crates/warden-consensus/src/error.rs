//! Consensus adapter error types.

use thiserror::Error;

/// Result type alias for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Errors raised by the consensus adapter.
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("malformed ensemble entry: {0}")]
    MalformedEnsemble(String),

    #[error("unknown ensemble member: {0}")]
    UnknownMember(String),

    #[error("raft error: {0}")]
    Raft(String),

    #[error("transport error: {0}")]
    Transport(String),
}
