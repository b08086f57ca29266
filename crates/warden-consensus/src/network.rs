//! Raft network layer backed by tonic gRPC.
//!
//! Implements `RaftNetworkFactory` and `RaftNetwork` so openraft can
//! talk between ensemble members. Every RPC serializes the openraft
//! request to JSON, ships it in a gRPC envelope, and deserializes the
//! response; remote raft errors travel in-band as a JSON string.

use openraft::error::{InstallSnapshotError, RPCError, RaftError, RemoteError, Unreachable};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use openraft::BasicNode;
use serde::Serialize;
use tracing::{debug, warn};

use crate::proto::raft_service_client::RaftServiceClient;
use crate::proto::{RaftRequest, RaftResponse};
use crate::typ::TypeConfig;

/// Which raft RPC to dispatch over the shared envelope.
enum Rpc {
    AppendEntries,
    Vote,
    InstallSnapshot,
}

/// Factory that creates per-peer gRPC connections.
pub struct NetworkFactory;

/// A single peer connection, dialed lazily and redialed after errors.
pub struct NetworkConnection {
    target: u64,
    addr: String,
    client: Option<RaftServiceClient<tonic::transport::Channel>>,
}

impl NetworkConnection {
    fn unreachable<E: std::error::Error>(&self, msg: &str) -> RPCError<u64, BasicNode, E> {
        RPCError::Unreachable(Unreachable::new(&std::io::Error::other(format!(
            "raft gRPC to node {} ({}): {msg}",
            self.target, self.addr
        ))))
    }

    async fn get_client(
        &mut self,
    ) -> Result<&mut RaftServiceClient<tonic::transport::Channel>, String> {
        if self.client.is_none() {
            let endpoint = format!("http://{}", self.addr);
            let ep = tonic::transport::Endpoint::from_shared(endpoint.clone())
                .map_err(|e| format!("invalid endpoint {endpoint}: {e}"))?;

            let channel = ep.connect().await.map_err(|e| {
                warn!(target_node = self.target, addr = %self.addr, error = %e, "failed to connect");
                format!("connect to {endpoint}: {e}")
            })?;

            debug!(target_node = self.target, addr = %self.addr, "connected to raft peer");
            self.client = Some(RaftServiceClient::new(channel));
        }
        Ok(self.client.as_mut().expect("client just installed"))
    }

    /// Serialize `payload`, dispatch it as `rpc`, and return the raw
    /// response envelope. A transport error drops the cached channel so
    /// the next call redials.
    async fn send<Req: Serialize>(&mut self, rpc: Rpc, payload: &Req) -> Result<RaftResponse, String> {
        let data = serde_json::to_vec(payload).map_err(|e| format!("serialize: {e}"))?;
        let client = self.get_client().await?;
        let request = RaftRequest { data };

        let result = match rpc {
            Rpc::AppendEntries => client.append_entries(request).await,
            Rpc::Vote => client.vote(request).await,
            Rpc::InstallSnapshot => client.install_snapshot(request).await,
        };

        match result {
            Ok(resp) => Ok(resp.into_inner()),
            Err(e) => {
                self.client = None;
                Err(format!("gRPC: {e}"))
            }
        }
    }
}

impl RaftNetworkFactory<TypeConfig> for NetworkFactory {
    type Network = NetworkConnection;

    async fn new_client(&mut self, target: u64, node: &BasicNode) -> Self::Network {
        debug!(target, addr = %node.addr, "creating raft network connection");
        NetworkConnection {
            target,
            addr: node.addr.clone(),
            client: None,
        }
    }
}

impl RaftNetwork<TypeConfig> for NetworkConnection {
    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<AppendEntriesResponse<u64>, RPCError<u64, BasicNode, RaftError<u64>>> {
        let inner = self
            .send(Rpc::AppendEntries, &rpc)
            .await
            .map_err(|e| self.unreachable(&e))?;

        if !inner.error.is_empty() {
            let raft_err: RaftError<u64> = serde_json::from_str(&inner.error)
                .unwrap_or_else(|_| RaftError::Fatal(openraft::error::Fatal::Panicked));
            return Err(RPCError::RemoteError(RemoteError::new(self.target, raft_err)));
        }

        serde_json::from_slice(&inner.data)
            .map_err(|e| self.unreachable(&format!("deserialize response: {e}")))
    }

    async fn vote(
        &mut self,
        rpc: VoteRequest<u64>,
        _option: RPCOption,
    ) -> Result<VoteResponse<u64>, RPCError<u64, BasicNode, RaftError<u64>>> {
        let inner = self
            .send(Rpc::Vote, &rpc)
            .await
            .map_err(|e| self.unreachable(&e))?;

        if !inner.error.is_empty() {
            let raft_err: RaftError<u64> = serde_json::from_str(&inner.error)
                .unwrap_or_else(|_| RaftError::Fatal(openraft::error::Fatal::Panicked));
            return Err(RPCError::RemoteError(RemoteError::new(self.target, raft_err)));
        }

        serde_json::from_slice(&inner.data)
            .map_err(|e| self.unreachable(&format!("deserialize response: {e}")))
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<
        InstallSnapshotResponse<u64>,
        RPCError<u64, BasicNode, RaftError<u64, InstallSnapshotError>>,
    > {
        let inner = self
            .send(Rpc::InstallSnapshot, &rpc)
            .await
            .map_err(|e| self.unreachable(&e))?;

        if !inner.error.is_empty() {
            let raft_err: RaftError<u64, InstallSnapshotError> =
                serde_json::from_str(&inner.error)
                    .unwrap_or_else(|_| RaftError::Fatal(openraft::error::Fatal::Panicked));
            return Err(RPCError::RemoteError(RemoteError::new(self.target, raft_err)));
        }

        serde_json::from_slice(&inner.data)
            .map_err(|e| self.unreachable(&format!("deserialize response: {e}")))
    }
}
