//! # Transfer Node Container
//!
//! Builds every adapter from `NodeConfig` and holds the wired engine, API
//! handler and broadcast coordinator for the lifetime of the process.
//!
//! ## Wiring
//!
//! ```text
//! NodeStore ─┐
//! Bincode ───┼──→ TransferService ──→ TransferApiHandler ←── FileBlockRepository
//! JSON-RPC ──┘                              ↑
//!                           FrameHandler (TRANSFER_PROTOCOL)
//!
//! TcpPeerTransport ──→ BroadcastCoordinator (announcements, remote calls)
//! ```

pub mod config;

pub use config::{ConfigError, NodeConfig};

use crate::adapters::{FileBlockRepository, JsonRpcChainClient, NodeStore, TcpPeerTransport};
use crate::server::{FrameHandler, ANNOUNCE_PROTOCOL, TRANSFER_PROTOCOL};
use async_trait::async_trait;
use peer_broadcast::{BroadcastCoordinator, BroadcastError, BroadcastReport, NetworkMessage, ResultCallback};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{BlockHash, FileHash};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use transfer_engine::adapters::{BincodeRecordSerializer, RandomIdSource, SystemTimeSource};
use transfer_engine::{
    handle_api_query, ApiResponse, ChainClientError, KVStoreError, TransferApiHandler, TransferDependencies,
    TransferError, TransferService,
};

pub type NodeService = TransferService<NodeStore, BincodeRecordSerializer, JsonRpcChainClient>;
pub type NodeApi = TransferApiHandler<NodeStore, BincodeRecordSerializer, JsonRpcChainClient, FileBlockRepository>;

/// Startup and peer-call failures.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("storage: {0}")]
    Store(#[from] KVStoreError),

    #[error("chain client: {0}")]
    Chain(#[from] ChainClientError),

    #[error("peer: {0}")]
    Peer(#[from] BroadcastError),

    #[error("peer sent an unreadable reply: {0}")]
    Protocol(String),
}

/// Body of a `TRANSFER_PROTOCOL` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCall {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Body of an `ANNOUNCE_PROTOCOL` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockAnnouncement {
    pub file_hash: FileHash,
    pub hashes: Vec<BlockHash>,
}

pub struct TransferNode {
    config: NodeConfig,
    api: NodeApi,
    broadcast: BroadcastCoordinator<TcpPeerTransport>,
}

impl TransferNode {
    /// Validate `config` and open every backend it names.
    pub fn build(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;

        let kv_store = NodeStore::open(&config.storage)?;
        let backend = kv_store.backend();
        let blocks = FileBlockRepository::open(config.storage.blocks_dir())?;
        let chain = JsonRpcChainClient::new(&config.chain)?;

        let service = TransferService::new(
            TransferDependencies {
                kv_store,
                serializer: BincodeRecordSerializer,
                chain: Arc::new(chain),
                time_source: Arc::new(SystemTimeSource),
                id_source: Arc::new(RandomIdSource),
            },
            config.transfer.clone(),
        );
        let api = TransferApiHandler::new(Arc::new(service), Arc::new(blocks));

        let transport = TcpPeerTransport::new(config.network.peers.clone());
        let broadcast = BroadcastCoordinator::new(Arc::new(transport), config.broadcast.clone());

        info!(
            data_dir = %config.storage.data_dir.display(),
            backend,
            peers = config.network.peers.len(),
            chain = %config.chain.rpc_url,
            "[transfer] 🚀 node components ready"
        );

        Ok(Self { config, api, broadcast })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn api(&self) -> &NodeApi {
        &self.api
    }

    pub fn broadcast(&self) -> &BroadcastCoordinator<TcpPeerTransport> {
        &self.broadcast
    }

    /// Run one transfer API call against the local engine.
    pub async fn query(&self, method: &str, params: Value) -> Value {
        match handle_api_query(&self.api, method, params).await {
            Ok(response) => response,
            Err(err) => {
                let response = ApiResponse::<()>::error(&TransferError::parameter(err.to_string()));
                serde_json::to_value(response).unwrap_or(Value::Null)
            }
        }
    }

    /// Tell every known peer which blocks of `file_hash` this node holds.
    ///
    /// `Ok(None)` when no peers are configured.
    pub async fn announce_blocks(
        &self,
        file_hash: &str,
        hashes: &[BlockHash],
    ) -> Result<Option<BroadcastReport>, BroadcastError> {
        let peers = self.broadcast.transport().known_peers();
        if peers.is_empty() {
            return Ok(None);
        }

        let announcement = BlockAnnouncement {
            file_hash: file_hash.to_string(),
            hashes: hashes.to_vec(),
        };
        let payload = serde_json::to_vec(&announcement)
            .map_err(|e| BroadcastError::transport("*", format!("cannot encode announcement: {e}")))?;
        let on_result: ResultCallback = Arc::new(|_: Option<Vec<u8>>, peer: &str| {
            debug!(peer, "[transfer] announcement delivered");
        });

        self.broadcast
            .broadcast(&peers, NetworkMessage::new(ANNOUNCE_PROTOCOL, payload), false, || false, on_result)
            .await
            .map(Some)
    }

    /// Call a transfer API method on a remote peer, retrying on timeout.
    pub async fn call_peer(&self, peer: &str, method: &str, params: Value) -> Result<Value, NodeError> {
        let call = RemoteCall {
            method: method.to_string(),
            params,
        };
        let payload = serde_json::to_vec(&call).map_err(|e| NodeError::Protocol(e.to_string()))?;
        let reply = self
            .broadcast
            .request_with_retry(peer, &NetworkMessage::new(TRANSFER_PROTOCOL, payload))
            .await?;
        serde_json::from_slice(&reply).map_err(|e| NodeError::Protocol(e.to_string()))
    }

    async fn handle_remote_call(&self, remote: SocketAddr, payload: &[u8]) -> Value {
        match serde_json::from_slice::<RemoteCall>(payload) {
            Ok(call) => {
                debug!(%remote, method = %call.method, "[transfer] remote call");
                self.query(&call.method, call.params).await
            }
            Err(e) => {
                let err = TransferError::parameter(format!("malformed remote call: {e}"));
                serde_json::to_value(ApiResponse::<()>::error(&err)).unwrap_or(Value::Null)
            }
        }
    }
}

#[async_trait]
impl FrameHandler for TransferNode {
    async fn handle(&self, remote: SocketAddr, message: NetworkMessage) -> Vec<u8> {
        let reply = match message.protocol.as_str() {
            TRANSFER_PROTOCOL => self.handle_remote_call(remote, &message.payload).await,
            ANNOUNCE_PROTOCOL => {
                match serde_json::from_slice::<BlockAnnouncement>(&message.payload) {
                    Ok(announcement) => info!(
                        %remote,
                        file_hash = %announcement.file_hash,
                        blocks = announcement.hashes.len(),
                        "[transfer] 📣 peer announced blocks"
                    ),
                    Err(e) => warn!(%remote, error = %e, "[transfer] unreadable announcement"),
                }
                Value::Null
            }
            other => {
                let err = TransferError::parameter(format!("unsupported protocol {other}"));
                serde_json::to_value(ApiResponse::<()>::error(&err)).unwrap_or(Value::Null)
            }
        };
        serde_json::to_vec(&reply).unwrap_or_default()
    }
}
