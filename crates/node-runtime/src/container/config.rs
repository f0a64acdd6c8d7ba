//! # Node Configuration
//!
//! Unified configuration for the storage node, loaded from `DFS_*`
//! environment variables with defaults for everything.
//!
//! ## Environment Variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DFS_DATA_DIR` | `./data` |
//! | `DFS_USE_ROCKSDB` | `false` |
//! | `DFS_LISTEN_ADDR` | `127.0.0.1:30400` |
//! | `DFS_PEERS` | empty, `addr=host:port,...` |
//! | `DFS_CHAIN_RPC_URL` | `http://127.0.0.1:20332` |
//! | `DFS_CHAIN_TIMEOUT_SECS` | `10` |
//! | `DFS_CHAIN_POLL_INTERVAL_MS` | `1000` |
//! | `DFS_BLOCK_SIZE` | `262144` |
//! | `DFS_REQUIRED_CONFIRMATIONS` | `0` |
//! | `DFS_CONFIRMATION_TIMEOUT_SECS` | `60` |
//! | `DFS_MAX_CONCURRENCY` | `10` |
//! | `DFS_REQUEST_TIMEOUT_SECS` | `15` |
//! | `DFS_RETRY_ATTEMPTS` | `3` |
//! | `DFS_FAILURE_POLICY` | `continue_on_error` |
//! | `DFS_LOG_LEVEL` | `info` |
//! | `DFS_JSON_LOGS` | `false` |
//!
//! `DFS_FAILURE_POLICY=continue_on_error` sends every batch of a broadcast
//! even after a peer failed and reports the failures once at the end.
//! `fail_fast` stops dispatching at the first batch boundary after a
//! failure, trading the replies of later peers for fewer wasted attempts.

use peer_broadcast::{BroadcastConfig, FailurePolicy};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use transfer_engine::TransferConfig;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable holds a value that does not parse.
    #[error("{name}={value:?} is invalid: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    /// A loaded value is out of range.
    #[error("{field} {reason}")]
    OutOfRange { field: &'static str, reason: String },

    /// The configuration asks for a backend this binary was built without.
    #[error("{0} requested but the binary was built without it")]
    FeatureDisabled(&'static str),
}

/// Complete node configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    pub storage: StorageConfig,
    pub network: NetworkConfig,
    pub chain: ChainConfig,
    pub transfer: TransferConfig,
    pub broadcast: BroadcastConfig,
    pub telemetry: TelemetryConfig,
}

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory: task store and block files live below it.
    pub data_dir: PathBuf,
    pub use_rocksdb: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            use_rocksdb: false,
        }
    }
}

impl StorageConfig {
    pub fn task_store_path(&self) -> PathBuf {
        if self.use_rocksdb {
            self.data_dir.join("tasks.rocksdb")
        } else {
            self.data_dir.join("tasks.kv")
        }
    }

    pub fn blocks_dir(&self) -> PathBuf {
        self.data_dir.join("blocks")
    }
}

/// Peer network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Address the framed transfer listener binds to.
    pub listen_addr: SocketAddr,
    /// Known peers: wallet address to socket address.
    pub peers: BTreeMap<String, SocketAddr>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 30400)),
            peers: BTreeMap::new(),
        }
    }
}

/// Chain JSON-RPC client configuration.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub request_timeout_secs: u64,
    /// Poll interval while waiting for confirmations.
    pub poll_interval_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:20332".to_string(),
            request_timeout_secs: 10,
            poll_interval_ms: 1_000,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// Filter used when `RUST_LOG` is unset.
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "dfs-node".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl NodeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source; unset variables keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let env = Env(&lookup);

        if let Some(dir) = lookup("DFS_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(dir);
        }
        env.parse_into("DFS_USE_ROCKSDB", &mut config.storage.use_rocksdb)?;

        env.parse_into("DFS_LISTEN_ADDR", &mut config.network.listen_addr)?;
        if let Some(peers) = lookup("DFS_PEERS") {
            config.network.peers = parse_peers(&peers)?;
        }

        if let Some(url) = lookup("DFS_CHAIN_RPC_URL") {
            config.chain.rpc_url = url;
        }
        env.parse_into("DFS_CHAIN_TIMEOUT_SECS", &mut config.chain.request_timeout_secs)?;
        env.parse_into("DFS_CHAIN_POLL_INTERVAL_MS", &mut config.chain.poll_interval_ms)?;

        env.parse_into("DFS_BLOCK_SIZE", &mut config.transfer.block_size_bytes)?;
        env.parse_into("DFS_REQUIRED_CONFIRMATIONS", &mut config.transfer.required_confirmations)?;
        if let Some(secs) = env.parse::<u64>("DFS_CONFIRMATION_TIMEOUT_SECS")? {
            config.transfer.confirmation_timeout = Duration::from_secs(secs);
        }

        env.parse_into("DFS_MAX_CONCURRENCY", &mut config.broadcast.max_concurrency)?;
        if let Some(secs) = env.parse::<u64>("DFS_REQUEST_TIMEOUT_SECS")? {
            config.broadcast.request_timeout = Duration::from_secs(secs);
        }
        env.parse_into("DFS_RETRY_ATTEMPTS", &mut config.broadcast.retry_attempts)?;
        if let Some(policy) = lookup("DFS_FAILURE_POLICY") {
            config.broadcast.failure_policy = parse_policy(&policy)?;
        }

        if let Some(level) = lookup("DFS_LOG_LEVEL") {
            config.telemetry.log_level = level;
        }
        env.parse_into("DFS_JSON_LOGS", &mut config.telemetry.json_logs)?;

        Ok(config)
    }

    /// Reject configurations the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transfer.block_size_bytes == 0 {
            return Err(out_of_range("transfer.block_size_bytes", "must be positive"));
        }
        if self.transfer.max_id_attempts == 0 {
            return Err(out_of_range("transfer.max_id_attempts", "must be positive"));
        }
        if self.broadcast.max_concurrency == 0 {
            return Err(out_of_range("broadcast.max_concurrency", "must be positive"));
        }
        if self.broadcast.request_timeout.is_zero() {
            return Err(out_of_range("broadcast.request_timeout", "must be positive"));
        }
        if self.chain.request_timeout_secs == 0 {
            return Err(out_of_range("chain.request_timeout_secs", "must be positive"));
        }
        if !(self.chain.rpc_url.starts_with("http://") || self.chain.rpc_url.starts_with("https://")) {
            return Err(out_of_range(
                "chain.rpc_url",
                format!("must be an http(s) URL, got {:?}", self.chain.rpc_url),
            ));
        }
        if self.storage.use_rocksdb && !cfg!(feature = "rocksdb") {
            return Err(ConfigError::FeatureDisabled("RocksDB storage"));
        }
        Ok(())
    }
}

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn parse<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match (self.0)(name) {
            None => Ok(None),
            Some(value) => value.trim().parse().map(Some).map_err(|e: T::Err| ConfigError::InvalidValue {
                name: name.to_string(),
                value,
                reason: e.to_string(),
            }),
        }
    }

    fn parse_into<T>(&self, name: &str, slot: &mut T) -> Result<(), ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some(value) = self.parse(name)? {
            *slot = value;
        }
        Ok(())
    }
}

fn out_of_range(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        reason: reason.into(),
    }
}

fn parse_peers(raw: &str) -> Result<BTreeMap<String, SocketAddr>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        name: "DFS_PEERS".to_string(),
        value: raw.to_string(),
        reason,
    };

    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (peer, addr) = entry
                .split_once('=')
                .ok_or_else(|| invalid(format!("entry {entry:?} is not addr=host:port")))?;
            let socket = addr
                .trim()
                .parse::<SocketAddr>()
                .map_err(|e| invalid(format!("entry {entry:?}: {e}")))?;
            Ok((peer.trim().to_string(), socket))
        })
        .collect()
}

fn parse_policy(raw: &str) -> Result<FailurePolicy, ConfigError> {
    match raw.trim() {
        "continue_on_error" => Ok(FailurePolicy::ContinueOnError),
        "fail_fast" => Ok(FailurePolicy::FailFast),
        other => Err(ConfigError::InvalidValue {
            name: "DFS_FAILURE_POLICY".to_string(),
            value: other.to_string(),
            reason: "expected continue_on_error or fail_fast".to_string(),
        }),
    }
}
