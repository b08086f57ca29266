//! The reconciled membership snapshot.
//!
//! A `MembershipSnapshot` is an immutable node → cluster map produced
//! by one complete reconciliation pass. It is always replaced
//! wholesale, never patched, so any holder of an `Arc` to one sees an
//! internally consistent point-in-time view.

use std::collections::{BTreeMap, BTreeSet};

/// Opaque identifier of one monitored cache cluster.
pub type ClusterId = String;

/// Opaque identifier of one cache-node member of a cluster.
pub type NodeId = String;

/// Point-in-time mapping of every registered node to its cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipSnapshot {
    nodes: BTreeMap<NodeId, ClusterId>,
}

impl MembershipSnapshot {
    /// Build a snapshot from a complete node → cluster map.
    pub fn new(nodes: BTreeMap<NodeId, ClusterId>) -> Self {
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    /// The cluster a node belongs to, if registered.
    pub fn cluster_of(&self, node: &str) -> Option<&str> {
        self.nodes.get(node).map(String::as_str)
    }

    /// Iterate `(node, cluster)` pairs in node order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &ClusterId)> {
        self.nodes.iter()
    }

    /// The distinct cluster identifiers present in this snapshot.
    pub fn clusters(&self) -> BTreeSet<&str> {
        self.nodes.values().map(String::as_str).collect()
    }

    /// Node identifiers belonging to one cluster, in node order.
    pub fn nodes_in(&self, cluster: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, c)| c.as_str() == cluster)
            .map(|(n, _)| n.as_str())
            .collect()
    }
}

/// Dialable address of a registered node.
///
/// Node identifiers follow the `<ip:port>-<hostname>` registry naming
/// convention; the address is the part before the first `-`. An
/// identifier without the hostname suffix is returned unchanged.
pub fn node_address(node_id: &str) -> &str {
    node_id.split_once('-').map_or(node_id, |(addr, _)| addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pairs: &[(&str, &str)]) -> MembershipSnapshot {
        MembershipSnapshot::new(
            pairs
                .iter()
                .map(|(n, c)| (n.to_string(), c.to_string()))
                .collect(),
        )
    }

    #[test]
    fn empty_snapshot() {
        let snap = MembershipSnapshot::default();
        assert!(snap.is_empty());
        assert_eq!(snap.len(), 0);
        assert!(snap.clusters().is_empty());
    }

    #[test]
    fn cluster_views() {
        let snap = snapshot(&[
            ("10.0.0.1:11211-cache01", "prod-cache-01"),
            ("10.0.0.2:11211-cache02", "prod-cache-01"),
            ("10.0.1.1:11211-sess01", "prod-session"),
        ]);

        assert_eq!(snap.len(), 3);
        assert_eq!(
            snap.clusters().into_iter().collect::<Vec<_>>(),
            vec!["prod-cache-01", "prod-session"]
        );
        assert_eq!(
            snap.nodes_in("prod-cache-01"),
            vec!["10.0.0.1:11211-cache01", "10.0.0.2:11211-cache02"]
        );
        assert_eq!(snap.cluster_of("10.0.1.1:11211-sess01"), Some("prod-session"));
        assert_eq!(snap.cluster_of("unknown"), None);
    }

    #[test]
    fn value_equality_is_structural() {
        let a = snapshot(&[("n1", "c1"), ("n2", "c1")]);
        let b = snapshot(&[("n2", "c1"), ("n1", "c1")]);
        assert_eq!(a, b);
    }

    #[test]
    fn node_address_strips_hostname_suffix() {
        assert_eq!(node_address("10.0.0.1:11211-cache01"), "10.0.0.1:11211");
        assert_eq!(node_address("10.0.0.1:11211"), "10.0.0.1:11211");
        assert_eq!(
            node_address("10.0.0.1:11211-host-with-dashes"),
            "10.0.0.1:11211"
        );
    }
}
