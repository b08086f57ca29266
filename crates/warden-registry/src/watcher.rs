//! Membership watcher — wholesale reconcile-on-notify.
//!
//! Converts registry change notifications into a freshly built
//! [`MembershipSnapshot`], published atomically over a tokio watch
//! channel. A failed pass publishes nothing, so consumers only ever see
//! the result of a complete reconciliation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::error::RegistryResult;
use crate::registry::{cache_list_path, cluster_path, Registry};
use crate::snapshot::MembershipSnapshot;

const BASE_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Reconciles registry state into membership snapshots.
pub struct MembershipWatcher {
    registry: Arc<dyn Registry>,
    root: String,
    filter: Regex,
    snapshot_tx: watch::Sender<Arc<MembershipSnapshot>>,
    base_backoff: Duration,
    max_backoff: Duration,
}

impl MembershipWatcher {
    /// Create a watcher over `registry` with a cluster-id filter
    /// pattern. Fails when the pattern is not a valid regex.
    pub fn new(
        registry: Arc<dyn Registry>,
        root: &str,
        cluster_pattern: &str,
    ) -> RegistryResult<Self> {
        let filter = Regex::new(cluster_pattern)?;
        let (snapshot_tx, _) = watch::channel(Arc::new(MembershipSnapshot::default()));
        Ok(Self {
            registry,
            root: root.to_string(),
            filter,
            snapshot_tx,
            base_backoff: BASE_BACKOFF,
            max_backoff: MAX_BACKOFF,
        })
    }

    /// Override the reconcile retry backoff bounds.
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    /// Subscribe to published snapshots.
    ///
    /// The receiver's current value is always the result of the most
    /// recent successful reconciliation (initially empty).
    pub fn subscribe(&self) -> watch::Receiver<Arc<MembershipSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Run one full reconciliation pass.
    ///
    /// Lists the cluster set, filters by pattern, installs a watch on
    /// each matching cluster, lists its members, and replaces the
    /// published snapshot wholesale. Any registry error aborts the pass
    /// before publication.
    pub async fn reconcile(&self) -> RegistryResult<Arc<MembershipSnapshot>> {
        let clusters = self
            .registry
            .list_children(&cache_list_path(&self.root))
            .await?;

        let mut nodes = BTreeMap::new();
        for cluster in clusters {
            if !self.filter.is_match(&cluster) {
                continue;
            }
            let path = cluster_path(&self.root, &cluster);
            // Watch before listing so a change racing the list fires a
            // notification instead of going unseen.
            self.registry.watch(&path).await?;
            let members = self.registry.list_children(&path).await?;
            debug!(%cluster, members = members.len(), "reconciled cluster member list");
            for member in members {
                nodes.insert(member, cluster.clone());
            }
        }

        let snapshot = Arc::new(MembershipSnapshot::new(nodes));
        self.snapshot_tx.send_replace(Arc::clone(&snapshot));
        info!(
            clusters = snapshot.clusters().len(),
            nodes = snapshot.len(),
            "membership snapshot replaced"
        );
        Ok(snapshot)
    }

    /// Drive reconcile-on-notify until shutdown.
    ///
    /// Performs an initial reconciliation, then re-reconciles on every
    /// registry change event. Failed passes are retried with
    /// exponential backoff; the previous snapshot stays published
    /// throughout.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut events = self.registry.events();

        if !self.reconcile_with_retry(&mut shutdown).await {
            return;
        }

        loop {
            tokio::select! {
                ev = events.recv() => match ev {
                    Ok(ev) => {
                        debug!(path = %ev.path, "membership change notification");
                        if !self.reconcile_with_retry(&mut shutdown).await {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "registry event feed lagged, reconciling");
                        if !self.reconcile_with_retry(&mut shutdown).await {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("registry event feed closed, watcher stopping");
                        return;
                    }
                },
                _ = shutdown.changed() => {
                    debug!("membership watcher stopping");
                    return;
                }
            }
        }
    }

    /// Retry reconciliation with exponential backoff until it succeeds
    /// or shutdown is signalled. Returns `false` on shutdown.
    async fn reconcile_with_retry(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let mut backoff = self.base_backoff;
        loop {
            match self.reconcile().await {
                Ok(_) => return true,
                Err(e) => {
                    warn!(error = %e, retry_in = ?backoff, "reconcile failed, keeping previous snapshot");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.changed() => return false,
                    }
                    backoff = (backoff * 2).min(self.max_backoff);
                }
            }
        }
    }
}
