//! Raft type configuration for the monitor ensemble.
//!
//! Wires together the openraft associated types: u64 node ids mapped
//! from ensemble member names, JSON request/response payloads, and the
//! tokio runtime.

use std::io::Cursor;

use openraft::TokioRuntime;

/// Client write request replicated through the ensemble.
///
/// The monitor replicates only its failover journal; leadership is the
/// point of the ensemble, not the data.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Request {
    /// Journal one emitted failover action.
    RecordFailover {
        node: String,
        cluster: String,
        /// Emission time, unix epoch seconds.
        at: u64,
    },
}

/// Response returned once a write is applied to the state machine.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Response {
    pub journaled: bool,
}

openraft::declare_raft_types!(
    /// Monitor ensemble raft type configuration.
    pub TypeConfig:
        D = Request,
        R = Response,
        NodeId = u64,
        Node = openraft::BasicNode,
        Entry = openraft::Entry<TypeConfig>,
        SnapshotData = Cursor<Vec<u8>>,
        AsyncRuntime = TokioRuntime,
);

/// Convenience alias for the raft instance.
pub type WardenRaft = openraft::Raft<TypeConfig>;
