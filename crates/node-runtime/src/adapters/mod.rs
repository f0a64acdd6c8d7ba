//! # Adapters
//!
//! Production implementations of the engine's and the broadcaster's
//! outbound ports.
//!
//! - `storage`: task store backends (file, RocksDB)
//! - `block_files`: block payloads on disk
//! - `chain_rpc`: JSON-RPC `PaymentChain`
//! - `tcp_transport`: framed TCP `PeerTransport`

pub mod block_files;
pub mod chain_rpc;
pub mod storage;
pub mod tcp_transport;

pub use block_files::FileBlockRepository;
pub use chain_rpc::JsonRpcChainClient;
pub use storage::NodeStore;
pub use tcp_transport::{read_frame, write_frame, FrameKind, TcpPeerTransport};
