//! In-memory raft state machine holding the failover journal.
//!
//! The only replicated payload is the journal of emitted failover
//! actions, bounded to the most recent [`JOURNAL_CAPACITY`] records so
//! every replica can answer "what did the monitor do lately" without
//! the journal growing forever.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use openraft::storage::{RaftSnapshotBuilder, RaftStateMachine};
use openraft::{
    Entry, EntryPayload, ErrorSubject, ErrorVerb, LogId, Snapshot, SnapshotMeta, StorageError,
    StoredMembership,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::typ::{Request, Response, TypeConfig};

/// Maximum journal length kept in replicated state.
pub const JOURNAL_CAPACITY: usize = 256;

fn read_err(e: impl std::fmt::Display) -> StorageError<u64> {
    StorageError::from_io_error(
        ErrorSubject::Store,
        ErrorVerb::Read,
        std::io::Error::other(e.to_string()),
    )
}

/// One journaled failover action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverRecord {
    pub node: String,
    pub cluster: String,
    /// Emission time, unix epoch seconds.
    pub at: u64,
}

#[derive(Default, Serialize, Deserialize)]
struct SmData {
    last_applied: Option<LogId<u64>>,
    membership: StoredMembership<u64, openraft::BasicNode>,
    journal: VecDeque<FailoverRecord>,
}

/// In-memory state machine. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct StateMachine {
    inner: Arc<Mutex<SmData>>,
}

/// Snapshot builder reading the current state machine contents.
pub struct SmSnapshotBuilder {
    inner: Arc<Mutex<SmData>>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The journaled failover actions, oldest first.
    pub fn journal(&self) -> Vec<FailoverRecord> {
        let inner = self.inner.lock().expect("state machine lock");
        inner.journal.iter().cloned().collect()
    }

    fn snapshot_data(&self) -> Result<(Vec<u8>, SnapshotMeta<u64, openraft::BasicNode>), StorageError<u64>> {
        let inner = self.inner.lock().expect("state machine lock");
        let data = serde_json::to_vec(&*inner).map_err(read_err)?;
        let snapshot_id = format!("snap-{}", inner.last_applied.map_or(0, |l| l.index));
        Ok((
            data,
            SnapshotMeta {
                last_log_id: inner.last_applied,
                last_membership: inner.membership.clone(),
                snapshot_id,
            },
        ))
    }
}

impl RaftStateMachine<TypeConfig> for StateMachine {
    type SnapshotBuilder = SmSnapshotBuilder;

    async fn applied_state(
        &mut self,
    ) -> Result<
        (
            Option<LogId<u64>>,
            StoredMembership<u64, openraft::BasicNode>,
        ),
        StorageError<u64>,
    > {
        let inner = self.inner.lock().expect("state machine lock");
        Ok((inner.last_applied, inner.membership.clone()))
    }

    async fn apply<I>(&mut self, entries: I) -> Result<Vec<Response>, StorageError<u64>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + Send,
        I::IntoIter: Send,
    {
        let mut inner = self.inner.lock().expect("state machine lock");
        let mut responses = Vec::new();

        for entry in entries {
            let log_id = entry.log_id;

            match entry.payload {
                EntryPayload::Blank => {
                    responses.push(Response { journaled: false });
                }
                EntryPayload::Normal(Request::RecordFailover { node, cluster, at }) => {
                    debug!(%node, %cluster, at, "journaled failover action");
                    inner.journal.push_back(FailoverRecord { node, cluster, at });
                    while inner.journal.len() > JOURNAL_CAPACITY {
                        inner.journal.pop_front();
                    }
                    responses.push(Response { journaled: true });
                }
                EntryPayload::Membership(membership) => {
                    inner.membership = StoredMembership::new(Some(log_id), membership);
                    responses.push(Response { journaled: false });
                }
            }

            inner.last_applied = Some(log_id);
        }

        Ok(responses)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        SmSnapshotBuilder {
            inner: Arc::clone(&self.inner),
        }
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<Cursor<Vec<u8>>>, StorageError<u64>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<u64, openraft::BasicNode>,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError<u64>> {
        let data: SmData = serde_json::from_slice(&snapshot.into_inner()).map_err(read_err)?;

        let mut inner = self.inner.lock().expect("state machine lock");
        inner.journal = data.journal;
        inner.last_applied = meta.last_log_id;
        inner.membership = meta.last_membership.clone();

        info!(records = inner.journal.len(), "installed snapshot");
        Ok(())
    }

    async fn get_current_snapshot(
        &mut self,
    ) -> Result<Option<Snapshot<TypeConfig>>, StorageError<u64>> {
        let applied = {
            let inner = self.inner.lock().expect("state machine lock");
            inner.last_applied
        };
        if applied.is_none() {
            return Ok(None);
        }

        let (data, meta) = self.snapshot_data()?;
        Ok(Some(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(data)),
        }))
    }
}

impl RaftSnapshotBuilder<TypeConfig> for SmSnapshotBuilder {
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<u64>> {
        let sm = StateMachine {
            inner: Arc::clone(&self.inner),
        };
        let (data, meta) = sm.snapshot_data()?;
        Ok(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}
