//! warden-health — liveness probing for registered cache nodes.
//!
//! One probe cycle fans out a concurrent liveness probe to every node
//! in a point-in-time membership snapshot, bounds each probe with a
//! timeout, and waits for all of them before reporting. The probe
//! payload itself is pluggable behind the [`Probe`] trait; the shipped
//! [`TcpProbe`] checks TCP reachability of the node address.
//!
//! Cycles never overlap: the caller awaits one cycle to completion
//! before starting the next, and a slow cycle defers (never duplicates)
//! the following tick.

pub mod cycle;
pub mod probe;

pub use cycle::{HealthConfig, ProbeCycle};
pub use probe::{Probe, ProbeFailure, ProbeOutcome, TcpProbe};
