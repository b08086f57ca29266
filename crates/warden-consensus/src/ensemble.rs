//! The fixed monitor ensemble.
//!
//! Members are configured as `name=host:port` pairs. openraft wants u64
//! node ids, so each member gets one derived from its position in the
//! sorted name order; the ensemble is fixed for the life of the
//! process, which makes the mapping stable across every replica given
//! the same configuration.

use std::collections::BTreeMap;

use openraft::BasicNode;

use crate::error::{ConsensusError, ConsensusResult};

/// The fixed set of monitor replicas participating in leader election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ensemble {
    /// Member name → host:port, sorted by name.
    members: BTreeMap<String, String>,
}

impl Ensemble {
    /// Parse an ensemble spec of the form `n1=host:port,n2=host:port`.
    pub fn parse(spec: &str) -> ConsensusResult<Self> {
        let mut members = BTreeMap::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, addr) = parse_member(entry)?;
            if members.insert(name.to_string(), addr.to_string()).is_some() {
                return Err(ConsensusError::MalformedEnsemble(format!(
                    "duplicate member name: {name}"
                )));
            }
        }
        if members.is_empty() {
            return Err(ConsensusError::MalformedEnsemble(
                "ensemble must name at least one member".to_string(),
            ));
        }
        Ok(Self { members })
    }

    /// Replace one member's address, for rejoining the ensemble under a
    /// new address. The member name must already exist.
    pub fn overwrite_peer(&mut self, spec: &str) -> ConsensusResult<()> {
        let (name, addr) = parse_member(spec)?;
        match self.members.get_mut(name) {
            Some(existing) => {
                *existing = addr.to_string();
                Ok(())
            }
            None => Err(ConsensusError::UnknownMember(name.to_string())),
        }
    }

    /// The raft node id of a member: 1-based index in sorted name order.
    pub fn raft_id(&self, name: &str) -> Option<u64> {
        self.members
            .keys()
            .position(|n| n == name)
            .map(|idx| idx as u64 + 1)
    }

    /// The configured address of a member.
    pub fn address_of(&self, name: &str) -> Option<&str> {
        self.members.get(name).map(String::as_str)
    }

    /// The full member map in openraft form, for cluster bootstrap.
    pub fn raft_members(&self) -> BTreeMap<u64, BasicNode> {
        self.members
            .values()
            .enumerate()
            .map(|(idx, addr)| (idx as u64 + 1, BasicNode::new(addr)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

fn parse_member(entry: &str) -> ConsensusResult<(&str, &str)> {
    let (name, addr) = entry.split_once('=').ok_or_else(|| {
        ConsensusError::MalformedEnsemble(format!("expected name=host:port, got: {entry}"))
    })?;
    let (name, addr) = (name.trim(), addr.trim());
    if name.is_empty() || addr.is_empty() || !addr.contains(':') {
        return Err(ConsensusError::MalformedEnsemble(format!(
            "expected name=host:port, got: {entry}"
        )));
    }
    Ok((name, addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_assigns_sorted_ids() {
        let ensemble = Ensemble::parse("m3=10.0.0.3:7101,m1=10.0.0.1:7101,m2=10.0.0.2:7101")
            .unwrap();
        assert_eq!(ensemble.len(), 3);
        assert_eq!(ensemble.raft_id("m1"), Some(1));
        assert_eq!(ensemble.raft_id("m2"), Some(2));
        assert_eq!(ensemble.raft_id("m3"), Some(3));
        assert_eq!(ensemble.raft_id("m4"), None);
    }

    #[test]
    fn raft_members_align_with_ids() {
        let ensemble = Ensemble::parse("b=10.0.0.2:7101,a=10.0.0.1:7101").unwrap();
        let members = ensemble.raft_members();
        assert_eq!(members[&1].addr, "10.0.0.1:7101");
        assert_eq!(members[&2].addr, "10.0.0.2:7101");
    }

    #[test]
    fn overwrite_peer_replaces_address() {
        let mut ensemble = Ensemble::parse("a=10.0.0.1:7101,b=10.0.0.2:7101").unwrap();
        ensemble.overwrite_peer("b=10.0.9.9:7101").unwrap();
        assert_eq!(ensemble.address_of("b"), Some("10.0.9.9:7101"));
        // Identity is unchanged.
        assert_eq!(ensemble.raft_id("b"), Some(2));
    }

    #[test]
    fn overwrite_unknown_peer_fails() {
        let mut ensemble = Ensemble::parse("a=10.0.0.1:7101").unwrap();
        assert!(matches!(
            ensemble.overwrite_peer("zz=10.0.0.9:7101"),
            Err(ConsensusError::UnknownMember(_))
        ));
    }

    #[test]
    fn malformed_specs_are_rejected() {
        assert!(Ensemble::parse("").is_err());
        assert!(Ensemble::parse("just-a-name").is_err());
        assert!(Ensemble::parse("a=no-port").is_err());
        assert!(Ensemble::parse("a=1.2.3.4:7101,a=1.2.3.5:7101").is_err());
    }
}
