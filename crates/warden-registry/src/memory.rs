//! In-process registry implementation.
//!
//! Holds the hierarchy in a plain map and fires change events
//! synchronously from its mutators. Doubles as the registry fake for
//! every test that needs scripted membership changes, including
//! injected read failures.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{RegistryError, RegistryResult};
use crate::registry::{Registry, RegistryEvent};

const EVENT_CAPACITY: usize = 64;

struct Inner {
    children: HashMap<String, BTreeSet<String>>,
    watched: HashSet<String>,
    /// `Some(n)`: the next `n` reads succeed, then reads fail until cleared.
    fail_after: Option<u32>,
}

/// In-memory `Registry` with scripted mutation and failure injection.
pub struct MemoryRegistry {
    inner: RwLock<Inner>,
    events: broadcast::Sender<RegistryEvent>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: RwLock::new(Inner {
                children: HashMap::new(),
                watched: HashSet::new(),
                fail_after: None,
            }),
            events,
        }
    }

    /// Replace the child list of `path`, firing an event if watched.
    pub fn set_children<I, S>(&self, path: &str, children: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut inner = self.inner.write().expect("registry lock");
            inner.children.insert(
                path.to_string(),
                children.into_iter().map(Into::into).collect(),
            );
        }
        self.notify(path);
    }

    /// Add one child under `path`, creating the path if absent.
    pub fn add_child(&self, path: &str, child: &str) {
        {
            let mut inner = self.inner.write().expect("registry lock");
            inner
                .children
                .entry(path.to_string())
                .or_default()
                .insert(child.to_string());
        }
        self.notify(path);
    }

    /// Remove one child under `path`. No-op if absent.
    pub fn remove_child(&self, path: &str, child: &str) {
        let removed = {
            let mut inner = self.inner.write().expect("registry lock");
            inner
                .children
                .get_mut(path)
                .is_some_and(|set| set.remove(child))
        };
        if removed {
            self.notify(path);
        }
    }

    /// Remove `path` entirely, firing an event if watched.
    pub fn remove_path(&self, path: &str) {
        let removed = {
            let mut inner = self.inner.write().expect("registry lock");
            inner.children.remove(path).is_some()
        };
        if removed {
            self.notify(path);
        }
    }

    /// Let the next `reads` list calls succeed, then fail every read
    /// until [`MemoryRegistry::clear_failures`].
    pub fn fail_after(&self, reads: u32) {
        self.inner.write().expect("registry lock").fail_after = Some(reads);
    }

    pub fn clear_failures(&self) {
        self.inner.write().expect("registry lock").fail_after = None;
    }

    fn notify(&self, path: &str) {
        let watched = {
            let inner = self.inner.read().expect("registry lock");
            inner.watched.contains(path)
        };
        if watched {
            // Send fails only when no subscriber exists, which is fine.
            let _ = self.events.send(RegistryEvent {
                path: path.to_string(),
            });
        }
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn list_children(&self, path: &str) -> RegistryResult<Vec<String>> {
        let mut inner = self.inner.write().expect("registry lock");
        match inner.fail_after {
            Some(0) => {
                return Err(RegistryError::Read {
                    path: path.to_string(),
                    reason: "injected read failure".to_string(),
                });
            }
            Some(ref mut n) => *n -= 1,
            None => {}
        }

        match inner.children.get(path) {
            Some(set) => Ok(set.iter().cloned().collect()),
            None => Err(RegistryError::NotFound(path.to_string())),
        }
    }

    async fn watch(&self, path: &str) -> RegistryResult<()> {
        let mut inner = self.inner.write().expect("registry lock");
        inner.watched.insert(path.to_string());
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_and_mutate() {
        let reg = MemoryRegistry::new();
        reg.set_children("/warden/cache_list", ["prod-cache-01"]);
        reg.add_child("/warden/cache_list/prod-cache-01", "n1");
        reg.add_child("/warden/cache_list/prod-cache-01", "n2");

        let clusters = reg.list_children("/warden/cache_list").await.unwrap();
        assert_eq!(clusters, vec!["prod-cache-01"]);

        let nodes = reg
            .list_children("/warden/cache_list/prod-cache-01")
            .await
            .unwrap();
        assert_eq!(nodes, vec!["n1", "n2"]);
    }

    #[tokio::test]
    async fn missing_path_is_not_found() {
        let reg = MemoryRegistry::new();
        let err = reg.list_children("/nowhere").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn events_fire_only_for_watched_paths() {
        let reg = MemoryRegistry::new();
        reg.set_children("/warden/cache_list/a", ["n1"]);
        reg.watch("/warden/cache_list/a").await.unwrap();

        let mut events = reg.events();
        reg.add_child("/warden/cache_list/a", "n2");
        reg.add_child("/warden/cache_list/b", "n3"); // Unwatched.

        let ev = events.recv().await.unwrap();
        assert_eq!(ev.path, "/warden/cache_list/a");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn injected_failures_start_after_allowed_reads() {
        let reg = MemoryRegistry::new();
        reg.set_children("/p", ["c"]);
        reg.fail_after(1);

        assert!(reg.list_children("/p").await.is_ok());
        assert!(reg.list_children("/p").await.is_err());
        assert!(reg.list_children("/p").await.is_err());

        reg.clear_failures();
        assert!(reg.list_children("/p").await.is_ok());
    }

    #[tokio::test]
    async fn remove_path_notifies_watchers() {
        let reg = MemoryRegistry::new();
        reg.set_children("/p", ["c"]);
        reg.watch("/p").await.unwrap();

        let mut events = reg.events();
        reg.remove_path("/p");
        assert_eq!(events.recv().await.unwrap().path, "/p");
    }
}
