//! The `Registry` trait — hierarchical list/watch operations.
//!
//! Models the subset of a coordination service the monitor needs:
//! listing the children of a path and subscribing to child-list
//! changes. Watches are persistent; a notification carries only the
//! changed path, and consumers are expected to re-read wholesale.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::RegistryResult;

/// A child-list change notification for a watched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEvent {
    pub path: String,
}

/// Hierarchical registry boundary.
///
/// Implementations must deliver a [`RegistryEvent`] on the feed
/// returned by [`Registry::events`] whenever the child list of a
/// watched path changes. Coalescing consecutive changes into one event
/// is allowed; dropping the last change for a watched path is not.
#[async_trait]
pub trait Registry: Send + Sync {
    /// List the children of `path`.
    async fn list_children(&self, path: &str) -> RegistryResult<Vec<String>>;

    /// Register change interest in the child list of `path`.
    ///
    /// Idempotent: watching an already-watched path is a no-op.
    async fn watch(&self, path: &str) -> RegistryResult<()>;

    /// Subscribe to the change-event feed.
    fn events(&self) -> broadcast::Receiver<RegistryEvent>;
}

/// Path holding the cluster list under a registry root.
pub fn cache_list_path(root: &str) -> String {
    format!("{}/cache_list", root.trim_end_matches('/'))
}

/// Path holding the member list of one cluster.
pub fn cluster_path(root: &str, cluster: &str) -> String {
    format!("{}/{}", cache_list_path(root), cluster)
}
