//! # Storage Node
//!
//! Entry point of the block-transfer node.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from `DFS_*` environment variables
//! 2. Initialize tracing
//! 3. Validate configuration and open the task store and block directory
//! 4. Bind the peer listener
//! 5. Signal ready, serve until Ctrl+C

use anyhow::{Context, Result};
use node_runtime::server;
use node_runtime::telemetry::init_tracing;
use node_runtime::{NodeConfig, TransferNode};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::from_env().context("Failed to load configuration")?;
    init_tracing(&config.telemetry).context("Failed to initialize tracing")?;

    info!("===========================================");
    info!("  DFS Storage Node v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let listen_addr = config.network.listen_addr;
    let node = Arc::new(TransferNode::build(config).context("Failed to build node")?);

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {listen_addr}"))?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let server = tokio::spawn(server::serve(listener, Arc::clone(&node), shutdown_rx));

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    server.await.context("Listener task failed")?;
    Ok(())
}
