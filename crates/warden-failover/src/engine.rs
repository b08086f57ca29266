//! The failover cooldown engine.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use warden_health::{ProbeFailure, ProbeOutcome};
use warden_registry::{ClusterId, NodeId};

/// Process-wide failover throttle state.
///
/// Owned and mutated exclusively by the [`FailoverEngine`]; everyone
/// else reads copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownState {
    /// Total failover actions emitted since startup. Never resets.
    pub failover_count: u64,
    /// Window length in seconds.
    pub cooldown_secs: u64,
    /// Start of the active window, unix epoch seconds. `None` = idle.
    pub cooldown_started_at: Option<u64>,
}

impl CooldownState {
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            failover_count: 0,
            cooldown_secs,
            cooldown_started_at: None,
        }
    }

    /// Whether the window is still active at `now`.
    pub fn cooling_down(&self, now: u64) -> bool {
        match self.cooldown_started_at {
            Some(start) => now < start + self.cooldown_secs,
            None => false,
        }
    }

    /// Seconds left in the active window; zero when idle.
    pub fn remaining_secs(&self, now: u64) -> u64 {
        match self.cooldown_started_at {
            Some(start) => (start + self.cooldown_secs).saturating_sub(now),
            None => 0,
        }
    }
}

/// A throttled failover decision, ready for an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverAction {
    pub node: NodeId,
    pub cluster: ClusterId,
    pub cause: Option<ProbeFailure>,
    /// Emission time, unix epoch seconds.
    pub at: u64,
}

/// Turns probe outcomes into cooldown-gated failover actions.
pub struct FailoverEngine {
    cooldown: CooldownState,
    /// Last observed health per node. Entries for nodes absent from an
    /// evaluation are pruned, so a removed-then-readded node starts
    /// fresh.
    observed: HashMap<NodeId, bool>,
    /// Candidates swallowed by an active window since startup.
    suppressed: u64,
}

impl FailoverEngine {
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            cooldown: CooldownState::new(cooldown_secs),
            observed: HashMap::new(),
            suppressed: 0,
        }
    }

    /// A copy of the current cooldown state, for status reporting.
    pub fn cooldown(&self) -> CooldownState {
        self.cooldown
    }

    pub fn suppressed_candidates(&self) -> u64 {
        self.suppressed
    }

    /// Forget per-node health observations.
    ///
    /// Called on gaining leadership: health history derived under a
    /// previous term must not inform this term's transitions. The
    /// cooldown window and counters survive role changes.
    pub fn reset_observations(&mut self) {
        self.observed.clear();
    }

    /// Evaluate one cycle's outcomes at time `now`.
    ///
    /// A node observed unhealthy whose previous observation was not
    /// already unhealthy is a candidate. The first candidate outside an
    /// active window becomes an action and opens the window; every
    /// other candidate — same call or later ones inside the window —
    /// is counted as suppressed.
    pub fn evaluate(&mut self, outcomes: &[ProbeOutcome], now: u64) -> Vec<FailoverAction> {
        // Lazy Cooldown → Idle transition.
        if let Some(start) = self.cooldown.cooldown_started_at {
            if now >= start + self.cooldown.cooldown_secs {
                debug!("cooldown window elapsed");
                self.cooldown.cooldown_started_at = None;
            }
        }

        let mut actions = Vec::new();
        let mut next_observed = HashMap::with_capacity(outcomes.len());

        for outcome in outcomes {
            let was_unhealthy = self.observed.get(&outcome.node) == Some(&false);
            next_observed.insert(outcome.node.clone(), outcome.healthy);

            if outcome.healthy || was_unhealthy {
                continue;
            }

            if self.cooldown.cooling_down(now) {
                self.suppressed += 1;
                info!(
                    node = %outcome.node,
                    cluster = %outcome.cluster,
                    remaining_secs = self.cooldown.remaining_secs(now),
                    "failover candidate suppressed during cooldown"
                );
                continue;
            }

            self.cooldown.failover_count += 1;
            self.cooldown.cooldown_started_at = Some(now);
            warn!(
                node = %outcome.node,
                cluster = %outcome.cluster,
                cause = ?outcome.cause,
                failover_count = self.cooldown.failover_count,
                "emitting failover action"
            );
            actions.push(FailoverAction {
                node: outcome.node.clone(),
                cluster: outcome.cluster.clone(),
                cause: outcome.cause.clone(),
                at: now,
            });
        }

        self.observed = next_observed;
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: u64 = 300;

    fn up(node: &str) -> ProbeOutcome {
        ProbeOutcome::pass(node.to_string(), "prod-cache-01".to_string(), 0)
    }

    fn down(node: &str) -> ProbeOutcome {
        ProbeOutcome::fail(
            node.to_string(),
            "prod-cache-01".to_string(),
            0,
            ProbeFailure::Connect("connection refused".to_string()),
        )
    }

    #[test]
    fn all_healthy_changes_nothing() {
        let mut engine = FailoverEngine::new(WINDOW);
        let before = engine.cooldown();

        let actions = engine.evaluate(&[up("n1"), up("n2"), up("n3")], 1000);

        assert!(actions.is_empty());
        assert_eq!(engine.cooldown(), before);
        assert_eq!(engine.suppressed_candidates(), 0);
    }

    #[test]
    fn first_failure_emits_one_action_and_opens_the_window() {
        let mut engine = FailoverEngine::new(WINDOW);
        engine.evaluate(&[up("n1"), up("n2"), up("n3")], 1000);

        let actions = engine.evaluate(&[up("n1"), down("n2"), up("n3")], 1010);

        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].node, "n2");
        assert_eq!(actions[0].at, 1010);
        assert!(matches!(actions[0].cause, Some(ProbeFailure::Connect(_))));

        let cooldown = engine.cooldown();
        assert_eq!(cooldown.failover_count, 1);
        assert_eq!(cooldown.cooldown_started_at, Some(1010));
        assert!(cooldown.cooling_down(1010 + WINDOW - 1));
        assert!(!cooldown.cooling_down(1010 + WINDOW));
    }

    #[test]
    fn second_failure_inside_the_window_is_suppressed() {
        let mut engine = FailoverEngine::new(WINDOW);
        engine.evaluate(&[up("n1"), up("n2")], 1000);
        engine.evaluate(&[up("n1"), down("n2")], 1010);

        let actions = engine.evaluate(&[down("n1"), down("n2")], 1050);

        assert!(actions.is_empty());
        assert_eq!(engine.cooldown().failover_count, 1);
        assert_eq!(engine.suppressed_candidates(), 1);
    }

    #[test]
    fn simultaneous_failures_emit_at_most_one_action() {
        let mut engine = FailoverEngine::new(WINDOW);
        engine.evaluate(&[up("n1"), up("n2"), up("n3")], 1000);

        let actions = engine.evaluate(&[down("n1"), down("n2"), down("n3")], 1010);

        assert_eq!(actions.len(), 1);
        assert_eq!(engine.cooldown().failover_count, 1);
        assert_eq!(engine.suppressed_candidates(), 2);
    }

    #[test]
    fn node_already_known_down_is_not_a_candidate() {
        let mut engine = FailoverEngine::new(WINDOW);
        engine.evaluate(&[down("n1")], 1000);
        assert_eq!(engine.cooldown().failover_count, 1);

        // Still down well past the window: unchanged state, no candidate.
        let actions = engine.evaluate(&[down("n1")], 1000 + WINDOW + 10);
        assert!(actions.is_empty());
        assert_eq!(engine.cooldown().failover_count, 1);
        assert_eq!(engine.suppressed_candidates(), 0);
    }

    #[test]
    fn window_expiry_is_checked_lazily() {
        let mut engine = FailoverEngine::new(WINDOW);
        engine.evaluate(&[down("n1"), up("n2")], 1000);

        // Next evaluation after the window: a fresh candidate acts again.
        let actions = engine.evaluate(&[down("n1"), down("n2")], 1000 + WINDOW);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].node, "n2");
        assert_eq!(engine.cooldown().failover_count, 2);
    }

    #[test]
    fn flapping_node_is_bounded_by_the_window() {
        let mut engine = FailoverEngine::new(WINDOW);

        // Oscillate every 10 seconds over 3 windows.
        let total = 3 * WINDOW;
        let mut actions = 0;
        let mut t = 1000;
        let mut healthy = true;
        while t < 1000 + total {
            let outcome = if healthy { up("n1") } else { down("n1") };
            actions += engine.evaluate(&[outcome], t).len();
            healthy = !healthy;
            t += 10;
        }

        // At most ceil(total / window) actions over the run.
        assert!(actions as u64 <= total.div_ceil(WINDOW));
        assert!(actions >= 1);
    }

    #[test]
    fn recovery_then_failure_is_a_fresh_candidate() {
        let mut engine = FailoverEngine::new(0); // No throttle.
        engine.evaluate(&[down("n1")], 1000);
        engine.evaluate(&[up("n1")], 1010);

        let actions = engine.evaluate(&[down("n1")], 1020);
        assert_eq!(actions.len(), 1);
        assert_eq!(engine.cooldown().failover_count, 2);
    }

    #[test]
    fn zero_window_never_throttles() {
        let mut engine = FailoverEngine::new(0);
        let actions = engine.evaluate(&[down("n1"), down("n2")], 1000);
        assert_eq!(actions.len(), 2);
        assert_eq!(engine.cooldown().failover_count, 2);
    }

    #[test]
    fn departed_nodes_are_pruned() {
        let mut engine = FailoverEngine::new(0);
        engine.evaluate(&[down("n1")], 1000);

        // Node leaves the membership, then comes back unhealthy: its
        // old known-down state must not swallow the new candidate.
        engine.evaluate(&[up("n2")], 1010);
        let actions = engine.evaluate(&[down("n1")], 1020);
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn reset_observations_keeps_cooldown() {
        let mut engine = FailoverEngine::new(WINDOW);
        engine.evaluate(&[down("n1")], 1000);
        let before = engine.cooldown();

        engine.reset_observations();
        assert_eq!(engine.cooldown(), before);

        // Inside the window the re-observed failure is suppressed, not
        // re-emitted.
        let actions = engine.evaluate(&[down("n1")], 1010);
        assert!(actions.is_empty());
        assert_eq!(engine.suppressed_candidates(), 1);
    }
}
