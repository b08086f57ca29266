//! Leadership state and its distribution channel.
//!
//! The consensus layer is consumed as an oracle: a watch channel
//! carrying the latest `{role, term}`. A reader acting on leadership
//! must re-read the channel immediately before the action and compare
//! both fields against the state it captured when the work began.

use tokio::sync::watch;

/// This replica's role in the monitor ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Allowed to probe and act, within the current term.
    Leader,
    /// Inert: another replica is (believed to be) acting.
    Follower,
    /// Consensus has not settled; behaves like `Follower`.
    Unknown,
}

/// Point-in-time leadership observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadershipState {
    pub role: Role,
    /// Monotonically increasing election term.
    pub term: u64,
}

impl LeadershipState {
    /// The pre-election state: role unknown, term zero.
    pub fn unknown() -> Self {
        Self {
            role: Role::Unknown,
            term: 0,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }
}

/// Writer half of the leadership channel; owned by the consensus relay.
pub struct LeadershipPublisher {
    tx: watch::Sender<LeadershipState>,
}

/// Reader half of the leadership channel.
#[derive(Clone)]
pub struct LeadershipWatch {
    rx: watch::Receiver<LeadershipState>,
}

/// Create a leadership channel seeded with `initial`.
pub fn leadership_channel(initial: LeadershipState) -> (LeadershipPublisher, LeadershipWatch) {
    let (tx, rx) = watch::channel(initial);
    (LeadershipPublisher { tx }, LeadershipWatch { rx })
}

impl LeadershipPublisher {
    /// Publish a new observation. Readers are only woken when role or
    /// term actually changed.
    pub fn publish(&self, state: LeadershipState) {
        self.tx.send_if_modified(|current| {
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        });
    }

    pub fn subscribe(&self) -> LeadershipWatch {
        LeadershipWatch {
            rx: self.tx.subscribe(),
        }
    }
}

impl LeadershipWatch {
    /// The latest observation, without consuming the change marker.
    pub fn current(&self) -> LeadershipState {
        *self.rx.borrow()
    }

    pub fn is_leader(&self) -> bool {
        self.current().is_leader()
    }

    /// The latest observation, marking it as seen.
    pub fn latest(&mut self) -> LeadershipState {
        *self.rx.borrow_and_update()
    }

    /// Wait for the next role or term transition.
    ///
    /// Errors only when the publisher is gone (consensus shut down).
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }
}
