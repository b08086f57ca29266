//! Probe cycle — bounded fan-out, wait-for-all fan-in.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use warden_registry::{node_address, MembershipSnapshot};

use crate::probe::{Probe, ProbeFailure, ProbeOutcome};

/// Probe cadence and bounds.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Cycle cadence.
    pub probe_interval: Duration,
    /// Deadline per probe; exceeding it records `ProbeFailure::Timeout`.
    pub probe_timeout: Duration,
    /// Cap on simultaneously in-flight probes within a cycle.
    pub max_concurrent_probes: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(2),
            max_concurrent_probes: 64,
        }
    }
}

/// Runs one concurrent probe pass over a membership snapshot.
///
/// The snapshot handed to [`ProbeCycle::run`] is a point-in-time copy;
/// membership changes landing mid-cycle affect only the next cycle.
pub struct ProbeCycle {
    probe: Arc<dyn Probe>,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl ProbeCycle {
    pub fn new(probe: Arc<dyn Probe>, config: &HealthConfig) -> Self {
        Self {
            probe,
            timeout: config.probe_timeout,
            permits: Arc::new(Semaphore::new(config.max_concurrent_probes.max(1))),
        }
    }

    /// Probe every node in `snapshot` concurrently and wait for all
    /// outcomes. No ordering is guaranteed between nodes.
    pub async fn run(&self, snapshot: &MembershipSnapshot) -> Vec<ProbeOutcome> {
        let mut tasks = JoinSet::new();

        for (node, cluster) in snapshot.iter() {
            let probe = Arc::clone(&self.probe);
            let permits = Arc::clone(&self.permits);
            let timeout = self.timeout;
            let node = node.clone();
            let cluster = cluster.clone();

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.expect("probe semaphore closed");
                let address = node_address(&node).to_string();

                match tokio::time::timeout(timeout, probe.probe(&address)).await {
                    Ok(Ok(())) => ProbeOutcome::pass(node, cluster, epoch_secs()),
                    Ok(Err(cause)) => {
                        debug!(%node, %address, %cause, "probe failed");
                        ProbeOutcome::fail(node, cluster, epoch_secs(), cause)
                    }
                    Err(_) => {
                        debug!(%node, %address, "probe timed out");
                        ProbeOutcome::fail(node, cluster, epoch_secs(), ProbeFailure::Timeout)
                    }
                }
            });
        }

        let mut outcomes = Vec::with_capacity(snapshot.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "probe task failed to join"),
            }
        }
        outcomes
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(pairs: &[(&str, &str)]) -> MembershipSnapshot {
        MembershipSnapshot::new(
            pairs
                .iter()
                .map(|(n, c)| (n.to_string(), c.to_string()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    /// Probe scripted by address: anything in `down` fails to connect.
    struct ScriptedProbe {
        down: HashSet<String>,
    }

    impl ScriptedProbe {
        fn all_up() -> Self {
            Self {
                down: HashSet::new(),
            }
        }

        fn with_down(addrs: &[&str]) -> Self {
            Self {
                down: addrs.iter().map(|a| a.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        async fn probe(&self, address: &str) -> Result<(), ProbeFailure> {
            if self.down.contains(address) {
                Err(ProbeFailure::Connect("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// Probe that never completes within any sane timeout.
    struct StuckProbe;

    #[async_trait]
    impl Probe for StuckProbe {
        async fn probe(&self, _address: &str) -> Result<(), ProbeFailure> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    /// Probe that tracks its own peak concurrency.
    struct CountingProbe {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Probe for CountingProbe {
        async fn probe(&self, _address: &str) -> Result<(), ProbeFailure> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(timeout_ms: u64, cap: usize) -> HealthConfig {
        HealthConfig {
            probe_interval: Duration::from_secs(10),
            probe_timeout: Duration::from_millis(timeout_ms),
            max_concurrent_probes: cap,
        }
    }

    #[tokio::test]
    async fn all_nodes_healthy() {
        let cycle = ProbeCycle::new(Arc::new(ScriptedProbe::all_up()), &config(500, 64));
        let snap = snapshot(&[
            ("10.0.0.1:11211-n1", "prod-cache-01"),
            ("10.0.0.2:11211-n2", "prod-cache-01"),
            ("10.0.0.3:11211-n3", "prod-cache-01"),
        ]);

        let outcomes = cycle.run(&snap).await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.healthy));
    }

    #[tokio::test]
    async fn failing_node_carries_cause() {
        let cycle = ProbeCycle::new(
            Arc::new(ScriptedProbe::with_down(&["10.0.0.2:11211"])),
            &config(500, 64),
        );
        let snap = snapshot(&[
            ("10.0.0.1:11211-n1", "prod-cache-01"),
            ("10.0.0.2:11211-n2", "prod-cache-01"),
        ]);

        let outcomes = cycle.run(&snap).await;
        let bad = outcomes
            .iter()
            .find(|o| o.node == "10.0.0.2:11211-n2")
            .unwrap();
        assert!(!bad.healthy);
        assert!(matches!(bad.cause, Some(ProbeFailure::Connect(_))));

        let good = outcomes
            .iter()
            .find(|o| o.node == "10.0.0.1:11211-n1")
            .unwrap();
        assert!(good.healthy);
    }

    #[tokio::test]
    async fn stuck_probe_is_recorded_as_timeout() {
        let cycle = ProbeCycle::new(Arc::new(StuckProbe), &config(50, 64));
        let snap = snapshot(&[("10.0.0.1:11211-n1", "prod-cache-01")]);

        let outcomes = cycle.run(&snap).await;
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].healthy);
        assert_eq!(outcomes[0].cause, Some(ProbeFailure::Timeout));
    }

    #[tokio::test]
    async fn empty_snapshot_issues_zero_probes() {
        let cycle = ProbeCycle::new(Arc::new(ScriptedProbe::all_up()), &config(500, 64));
        let outcomes = cycle.run(&MembershipSnapshot::default()).await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn concurrency_stays_under_the_cap() {
        let probe = Arc::new(CountingProbe {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let cycle = ProbeCycle::new(Arc::clone(&probe) as Arc<dyn Probe>, &config(5000, 2));

        let snap = snapshot(&[
            ("10.0.0.1:11211-a", "c"),
            ("10.0.0.2:11211-b", "c"),
            ("10.0.0.3:11211-c", "c"),
            ("10.0.0.4:11211-d", "c"),
            ("10.0.0.5:11211-e", "c"),
            ("10.0.0.6:11211-f", "c"),
        ]);

        let outcomes = cycle.run(&snap).await;
        assert_eq!(outcomes.len(), 6);
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn wait_for_all_collects_every_outcome() {
        // Mix of fast passes and one timeout; the cycle still reports all.
        struct MixedProbe;

        #[async_trait]
        impl Probe for MixedProbe {
            async fn probe(&self, address: &str) -> Result<(), ProbeFailure> {
                if address.ends_with(":1") {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                Ok(())
            }
        }

        let cycle = ProbeCycle::new(Arc::new(MixedProbe), &config(50, 64));
        let snap = snapshot(&[
            ("10.0.0.1:1-slow", "c"),
            ("10.0.0.2:11211-fast1", "c"),
            ("10.0.0.3:11211-fast2", "c"),
        ]);

        let outcomes = cycle.run(&snap).await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes.iter().filter(|o| o.healthy).count(), 2);
    }
}
