//! warden-registry — registry boundary and membership reconciliation.
//!
//! Monitored cache clusters register themselves in an external
//! hierarchical registry under `{root}/cache_list/<cluster>`, where each
//! cluster path's children are the member node identifiers. This crate
//! provides:
//!
//! - The [`Registry`] trait: list/watch operations plus a change-event
//!   feed, keeping the actual coordination service pluggable.
//! - [`MemoryRegistry`]: an in-process implementation used by tests and
//!   local setups.
//! - [`FileRegistry`]: a TOML-file-backed implementation polled for
//!   changes.
//! - [`MembershipWatcher`]: reconciles the registry into an immutable
//!   [`MembershipSnapshot`] published wholesale over a watch channel.
//!
//! # Reconciliation model
//!
//! A change notification never patches the snapshot incrementally. The
//! watcher re-lists the full cluster set, filters cluster ids against a
//! configured pattern, re-lists every member list, and atomically
//! replaces the published snapshot. A registry error aborts the whole
//! pass and leaves the previous snapshot in place — consumers observe
//! stale-but-consistent data, never a torn map.

pub mod error;
pub mod file;
pub mod memory;
pub mod registry;
pub mod snapshot;
pub mod watcher;

pub use error::{RegistryError, RegistryResult};
pub use file::FileRegistry;
pub use memory::MemoryRegistry;
pub use registry::{cache_list_path, cluster_path, Registry, RegistryEvent};
pub use snapshot::{node_address, ClusterId, MembershipSnapshot, NodeId};
pub use watcher::MembershipWatcher;
