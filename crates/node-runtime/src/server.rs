//! # Frame Listener
//!
//! Accepts peer connections and hands every inbound frame to a
//! [`FrameHandler`]. Request frames get exactly one reply frame; one-way
//! frames get none.

use crate::adapters::tcp_transport::{read_frame, write_frame, FrameKind};
use async_trait::async_trait;
use peer_broadcast::NetworkMessage;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Protocol id of transfer API calls: payload `{"method", "params"}`.
pub const TRANSFER_PROTOCOL: &str = "/dfs/transfer/1.0.0";

/// Protocol id of block announcements.
pub const ANNOUNCE_PROTOCOL: &str = "/dfs/announce/1.0.0";

#[async_trait]
pub trait FrameHandler: Send + Sync + 'static {
    /// Handle one inbound message; the result is the reply payload.
    async fn handle(&self, remote: SocketAddr, message: NetworkMessage) -> Vec<u8>;
}

/// Accept connections until `shutdown` flips to true.
pub async fn serve<H: FrameHandler>(listener: TcpListener, handler: Arc<H>, mut shutdown: watch::Receiver<bool>) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "[transfer] 📡 listening for peers");
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    let handler = Arc::clone(&handler);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, remote, handler, shutdown).await {
                            debug!(%remote, error = %e, "[transfer] peer connection closed with error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "[transfer] accept failed"),
            },
            _ = shutdown.changed() => {
                info!("[transfer] listener shutting down");
                return;
            }
        }
    }
}

async fn serve_connection<H: FrameHandler>(
    mut stream: TcpStream,
    remote: SocketAddr,
    handler: Arc<H>,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()> {
    loop {
        let frame = tokio::select! {
            frame = read_frame(&mut stream) => frame,
            _ = shutdown.changed() => return Ok(()),
        };
        let (kind, message) = match frame {
            Ok(frame) => frame,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        match kind {
            FrameKind::Request => {
                let protocol = message.protocol.clone();
                let reply = handler.handle(remote, message).await;
                write_frame(&mut stream, FrameKind::Reply, &NetworkMessage::new(protocol, reply)).await?;
            }
            FrameKind::OneWay => {
                handler.handle(remote, message).await;
            }
            FrameKind::Reply => {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "unsolicited reply frame"));
            }
        }
    }
}
