// openraft's StorageError is large; silence the lint rather than box it.
#![allow(clippy::result_large_err)]

//! warden-consensus — single-leader coordination for the monitor ensemble.
//!
//! A fixed ensemble of monitor replicas runs raft (via openraft) purely
//! to agree on which replica is allowed to act. The rest of the system
//! consumes this crate through two narrow surfaces:
//!
//! - [`LeadershipWatch`]: a watch channel carrying the current
//!   `{role, term}`. Consumers must re-read it immediately before any
//!   externally-visible action; the oracle can be stale for a bounded
//!   window, and the double-check narrows (but cannot close) the
//!   dual-leader race.
//! - [`ConsensusNode::record_failover`]: best-effort replication of the
//!   failover journal for ensemble-wide observability.
//!
//! # Architecture
//!
//! - **`role`** — `Role`/`LeadershipState` and the leadership channel
//! - **`ensemble`** — fixed member set, deterministic raft-id mapping,
//!   peer-address overrides for rejoining under a new address
//! - **`typ`** — openraft type configuration (JSON payloads)
//! - **`log_store`** / **`state_machine`** — in-memory raft storage;
//!   the state machine holds the bounded failover journal
//! - **`network`** / **`server`** — tonic gRPC transport carrying
//!   JSON-serialized raft RPCs
//! - **`node`** — assembles the raft instance and relays its metrics
//!   into the leadership channel

pub mod ensemble;
pub mod error;
pub mod log_store;
pub mod network;
pub mod node;
pub mod role;
pub mod server;
pub mod state_machine;
pub mod typ;

pub mod proto {
    tonic::include_proto!("wardenraft");
}

pub use ensemble::Ensemble;
pub use error::{ConsensusError, ConsensusResult};
pub use log_store::LogStore;
pub use network::{NetworkConnection, NetworkFactory};
pub use node::ConsensusNode;
pub use role::{leadership_channel, LeadershipPublisher, LeadershipState, LeadershipWatch, Role};
pub use server::ConsensusServer;
pub use state_machine::{FailoverRecord, StateMachine};
pub use typ::{Request, Response, TypeConfig, WardenRaft};
