//! TOML-file-backed registry implementation.
//!
//! Stands in for a real coordination service: the file holds a
//! `[clusters]` table mapping cluster ids to member node lists, and a
//! poll loop diffs the file contents to synthesize change events for
//! watched paths.
//!
//! ```toml
//! [clusters]
//! "prod-cache-01" = ["10.0.0.1:11211-cache01", "10.0.0.2:11211-cache02"]
//! "prod-session"  = ["10.0.1.1:11211-sess01"]
//! ```
//!
//! A file that fails to read or parse leaves the previously loaded
//! contents in place; consumers keep observing the last good state.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::registry::{cache_list_path, cluster_path, Registry, RegistryEvent};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    clusters: BTreeMap<String, Vec<String>>,
}

#[derive(Debug)]
struct FileState {
    clusters: BTreeMap<String, BTreeSet<String>>,
    watched: HashSet<String>,
}

/// Registry backed by a polled TOML file.
#[derive(Debug)]
pub struct FileRegistry {
    path: PathBuf,
    root: String,
    state: RwLock<FileState>,
    events: broadcast::Sender<RegistryEvent>,
}

impl FileRegistry {
    /// Load the registry file. Fails when the file is unreadable or
    /// malformed — at startup that is a fatal configuration error.
    pub fn open(path: impl Into<PathBuf>, root: &str) -> RegistryResult<Self> {
        let path = path.into();
        let clusters = read_clusters(&path)?;
        info!(path = %path.display(), clusters = clusters.len(), "registry file loaded");

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            path,
            root: root.to_string(),
            state: RwLock::new(FileState {
                clusters,
                watched: HashSet::new(),
            }),
            events,
        })
    }

    /// Re-read the file and fire events for watched paths whose child
    /// list changed. Returns the number of changed paths.
    pub fn reload(&self) -> RegistryResult<usize> {
        let fresh = read_clusters(&self.path)?;

        let changed = {
            let mut state = self.state.write().expect("registry lock");
            let mut changed = Vec::new();

            let old_names: BTreeSet<&String> = state.clusters.keys().collect();
            let new_names: BTreeSet<&String> = fresh.keys().collect();
            if old_names != new_names {
                changed.push(cache_list_path(&self.root));
            }

            for (cluster, members) in &fresh {
                if state.clusters.get(cluster) != Some(members) {
                    changed.push(cluster_path(&self.root, cluster));
                }
            }
            for cluster in state.clusters.keys() {
                if !fresh.contains_key(cluster) {
                    changed.push(cluster_path(&self.root, cluster));
                }
            }

            state.clusters = fresh;
            changed
                .into_iter()
                .filter(|p| state.watched.contains(p))
                .collect::<Vec<_>>()
        };

        for path in &changed {
            debug!(%path, "registry file change detected");
            let _ = self.events.send(RegistryEvent { path: path.clone() });
        }
        Ok(changed.len())
    }

    /// Poll the file on `interval` until shutdown.
    ///
    /// Read or parse failures keep the last good contents and are
    /// logged, never propagated.
    pub async fn poll(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reload() {
                        warn!(path = %self.path.display(), error = %e, "registry file reload failed");
                    }
                }
                _ = shutdown.changed() => {
                    debug!("registry file poll stopping");
                    break;
                }
            }
        }
    }
}

fn read_clusters(path: &Path) -> RegistryResult<BTreeMap<String, BTreeSet<String>>> {
    let text = std::fs::read_to_string(path).map_err(|e| RegistryError::Connect(format!(
        "read {}: {e}",
        path.display()
    )))?;
    let parsed: RegistryFile = toml::from_str(&text).map_err(|e| RegistryError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(parsed
        .clusters
        .into_iter()
        .map(|(cluster, members)| (cluster, members.into_iter().collect()))
        .collect())
}

#[async_trait]
impl Registry for FileRegistry {
    async fn list_children(&self, path: &str) -> RegistryResult<Vec<String>> {
        let state = self.state.read().expect("registry lock");

        if path == cache_list_path(&self.root) {
            return Ok(state.clusters.keys().cloned().collect());
        }

        let prefix = format!("{}/", cache_list_path(&self.root));
        if let Some(cluster) = path.strip_prefix(&prefix) {
            return match state.clusters.get(cluster) {
                Some(members) => Ok(members.iter().cloned().collect()),
                None => Err(RegistryError::NotFound(path.to_string())),
            };
        }

        Err(RegistryError::NotFound(path.to_string()))
    }

    async fn watch(&self, path: &str) -> RegistryResult<()> {
        let mut state = self.state.write().expect("registry lock");
        state.watched.insert(path.to_string());
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_registry(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "warden-registry-{}-{}.toml",
            name,
            std::process::id()
        ));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn open_and_list() {
        let path = temp_registry(
            "open",
            r#"
[clusters]
"prod-cache-01" = ["10.0.0.1:11211-a", "10.0.0.2:11211-b"]
"prod-session" = ["10.0.1.1:11211-c"]
"#,
        );
        let reg = FileRegistry::open(&path, "/warden").unwrap();

        let clusters = reg.list_children("/warden/cache_list").await.unwrap();
        assert_eq!(clusters, vec!["prod-cache-01", "prod-session"]);

        let nodes = reg
            .list_children("/warden/cache_list/prod-cache-01")
            .await
            .unwrap();
        assert_eq!(nodes, vec!["10.0.0.1:11211-a", "10.0.0.2:11211-b"]);

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn open_missing_file_fails() {
        assert!(FileRegistry::open("/nonexistent/registry.toml", "/warden").is_err());
    }

    #[tokio::test]
    async fn open_malformed_file_fails() {
        let path = temp_registry("malformed", "clusters = 12");
        assert!(matches!(
            FileRegistry::open(&path, "/warden").unwrap_err(),
            RegistryError::Parse { .. }
        ));
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn reload_fires_events_for_watched_paths() {
        let path = temp_registry(
            "reload",
            r#"
[clusters]
"prod-cache-01" = ["n1"]
"#,
        );
        let reg = FileRegistry::open(&path, "/warden").unwrap();
        reg.watch("/warden/cache_list/prod-cache-01").await.unwrap();
        let mut events = reg.events();

        std::fs::write(
            &path,
            r#"
[clusters]
"prod-cache-01" = ["n1", "n2"]
"#,
        )
        .unwrap();
        assert_eq!(reg.reload().unwrap(), 1);

        let ev = events.recv().await.unwrap();
        assert_eq!(ev.path, "/warden/cache_list/prod-cache-01");

        let nodes = reg
            .list_children("/warden/cache_list/prod-cache-01")
            .await
            .unwrap();
        assert_eq!(nodes, vec!["n1", "n2"]);

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn reload_failure_keeps_last_good_contents() {
        let path = temp_registry(
            "keep-good",
            r#"
[clusters]
"prod-cache-01" = ["n1"]
"#,
        );
        let reg = FileRegistry::open(&path, "/warden").unwrap();

        std::fs::write(&path, "not valid toml [").unwrap();
        assert!(reg.reload().is_err());

        let nodes = reg
            .list_children("/warden/cache_list/prod-cache-01")
            .await
            .unwrap();
        assert_eq!(nodes, vec!["n1"]);

        std::fs::remove_file(path).unwrap();
    }
}
