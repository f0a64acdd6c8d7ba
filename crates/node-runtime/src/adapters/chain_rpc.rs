//! # Chain JSON-RPC Client
//!
//! `PaymentChain` over the chain node's JSON-RPC endpoint.
//!
//! Methods used:
//! - `getSmartContractEvent [txHash]` → event object, or `null` if unknown
//! - `getBlockCount []` → current height

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use transfer_engine::{ChainClientError, ContractEvent, Notification, PaymentChain};

use crate::container::config::ChainConfig;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    method: &'a str,
    params: P,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Event shape returned by the chain node.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcContractEvent {
    tx_hash: String,
    #[serde(alias = "blockIndex")]
    height: u64,
    #[serde(default)]
    notifications: Vec<RpcNotification>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcNotification {
    contract_address: String,
    #[serde(default)]
    states: serde_json::Value,
}

impl From<RpcContractEvent> for ContractEvent {
    fn from(event: RpcContractEvent) -> Self {
        ContractEvent {
            tx_hash: event.tx_hash,
            height: event.height,
            notifications: event
                .notifications
                .into_iter()
                .map(|n| Notification {
                    contract_address: n.contract_address,
                    states: n.states,
                })
                .collect(),
        }
    }
}

/// JSON-RPC chain client.
pub struct JsonRpcChainClient {
    client: Client,
    rpc_url: String,
    poll_interval: Duration,
    request_id: AtomicU64,
}

impl JsonRpcChainClient {
    pub fn new(config: &ChainConfig) -> Result<Self, ChainClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.request_timeout_secs.min(5)))
            .build()
            .map_err(|e| ChainClientError::new(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            rpc_url: config.rpc_url.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            request_id: AtomicU64::new(1),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Call `method`; `Ok(None)` when the node answers with a null result.
    async fn call<P, R>(&self, method: &str, params: P) -> Result<Option<R>, ChainClientError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
        };

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ChainClientError::new(format!("cannot connect to {}", self.rpc_url))
                } else {
                    ChainClientError::new(format!("{method} request failed: {e}"))
                }
            })?;

        let body: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| ChainClientError::new(format!("{method} returned malformed JSON: {e}")))?;

        if let Some(error) = body.error {
            return Err(ChainClientError::new(format!(
                "{method} failed with code {}: {}",
                error.code, error.message
            )));
        }
        Ok(body.result)
    }

    pub async fn block_count(&self) -> Result<u64, ChainClientError> {
        self.call::<[(); 0], u64>("getBlockCount", [])
            .await?
            .ok_or_else(|| ChainClientError::new("getBlockCount returned no result"))
    }
}

#[async_trait]
impl PaymentChain for JsonRpcChainClient {
    async fn smart_contract_event(&self, tx_hash: &str) -> Result<Option<ContractEvent>, ChainClientError> {
        let event = self
            .call::<[&str; 1], RpcContractEvent>("getSmartContractEvent", [tx_hash])
            .await?;
        debug!(tx_hash, found = event.is_some(), "[transfer] chain event lookup");
        Ok(event.map(ContractEvent::from))
    }

    /// Polls the block count; the caller bounds the wait.
    async fn wait_for_confirmation(&self, height: u64) -> Result<(), ChainClientError> {
        loop {
            let current = self.block_count().await?;
            if current >= height {
                return Ok(());
            }
            debug!(current, target = height, "[transfer] waiting for confirmations");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
