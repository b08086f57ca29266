//! Raft gRPC server — handles incoming raft RPCs from ensemble peers.
//!
//! Wraps the raft instance and implements the `RaftService` gRPC
//! interface. Each RPC deserializes its JSON payload, calls the
//! corresponding openraft method, and returns either the serialized
//! response or the serialized raft error in-band.

use std::sync::Arc;

use serde::Serialize;
use tonic::{Request, Response, Status};
use tracing::debug;

use crate::proto;
use crate::proto::raft_service_server::RaftService;
use crate::typ::{TypeConfig, WardenRaft};

/// gRPC implementation of the raft service.
pub struct ConsensusServer {
    raft: Arc<WardenRaft>,
}

impl ConsensusServer {
    pub fn new(raft: Arc<WardenRaft>) -> Self {
        Self { raft }
    }

    /// The tonic service for mounting on a gRPC server.
    pub fn into_service(self) -> proto::raft_service_server::RaftServiceServer<Self> {
        proto::raft_service_server::RaftServiceServer::new(self)
    }
}

fn decode<T: serde::de::DeserializeOwned>(request: Request<proto::RaftRequest>) -> Result<T, Status> {
    serde_json::from_slice(&request.into_inner().data)
        .map_err(|e| Status::invalid_argument(format!("deserialize: {e}")))
}

fn reply<R: Serialize, E: Serialize>(
    result: Result<R, E>,
) -> Result<Response<proto::RaftResponse>, Status> {
    match result {
        Ok(resp) => {
            let data = serde_json::to_vec(&resp)
                .map_err(|e| Status::internal(format!("serialize: {e}")))?;
            Ok(Response::new(proto::RaftResponse {
                data,
                error: String::new(),
            }))
        }
        Err(e) => {
            let error = serde_json::to_string(&e)
                .map_err(|e| Status::internal(format!("serialize error: {e}")))?;
            Ok(Response::new(proto::RaftResponse {
                data: Vec::new(),
                error,
            }))
        }
    }
}

#[tonic::async_trait]
impl RaftService for ConsensusServer {
    async fn append_entries(
        &self,
        request: Request<proto::RaftRequest>,
    ) -> Result<Response<proto::RaftResponse>, Status> {
        let req: openraft::raft::AppendEntriesRequest<TypeConfig> = decode(request)?;
        debug!(term = req.vote.leader_id().term, "handling append_entries RPC");
        reply(self.raft.append_entries(req).await)
    }

    async fn vote(
        &self,
        request: Request<proto::RaftRequest>,
    ) -> Result<Response<proto::RaftResponse>, Status> {
        let req: openraft::raft::VoteRequest<u64> = decode(request)?;
        debug!(term = req.vote.leader_id().term, "handling vote RPC");
        reply(self.raft.vote(req).await)
    }

    async fn install_snapshot(
        &self,
        request: Request<proto::RaftRequest>,
    ) -> Result<Response<proto::RaftResponse>, Status> {
        let req: openraft::raft::InstallSnapshotRequest<TypeConfig> = decode(request)?;
        debug!("handling install_snapshot RPC");
        reply(self.raft.install_snapshot(req).await)
    }
}
