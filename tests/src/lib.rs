//! # DFS Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── transfer_flow.rs    # upload → pay → download → complete, JSON in and out
//!     ├── persistent_node.rs  # TransferNode over on-disk stores, across restarts
//!     └── peer_network.rs     # fan-out and remote calls between nodes
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p dfs-tests
//! cargo test -p dfs-tests integration::peer_network
//! cargo bench -p dfs-tests
//! ```

pub mod integration;
