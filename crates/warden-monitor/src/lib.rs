//! warden-monitor — the top-level control loop.
//!
//! The orchestrator wires the subsystems together and gates every side
//! effect on leadership:
//!
//! ```text
//! Orchestrator
//!   ├── LeadershipWatch (consensus)  — who may act, re-checked before
//!   │                                  every externally-visible effect
//!   ├── MembershipWatcher (registry) — started on gaining leadership,
//!   │                                  stopped on losing it
//!   ├── ProbeCycle (health)          — one cycle in flight, snapshot
//!   │                                  captured at cycle start
//!   ├── FailoverEngine (failover)    — cooldown-gated action emission
//!   └── StatusHandle                 — lock-free snapshot reads for
//!                                      operator tooling
//! ```
//!
//! A follower (or a replica whose role is still unknown) runs the same
//! loop but skips all cycle work. Losing leadership mid-cycle lets the
//! in-flight probes drain and then discards their outcomes.

pub mod orchestrator;
pub mod status;

pub use orchestrator::{JournalCallback, MonitorConfig, Orchestrator};
pub use status::{ClusterStatus, MonitorStatus, NodeStatus, StatusHandle};
