//! # TCP Peer Transport
//!
//! `PeerTransport` over plain TCP with one persistent connection per peer.
//!
//! ## Frame Layout
//!
//! ```text
//! [magic "DFS1"][kind:u8][protocol_len:u32 BE][protocol][payload_len:u32 BE][payload]
//! ```
//!
//! `kind` is one-way (no answer), request (answered by exactly one reply
//! frame) or reply.

use async_trait::async_trait;
use parking_lot::Mutex;
use peer_broadcast::{BroadcastError, NetworkMessage, PeerTransport};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

pub const FRAME_MAGIC: [u8; 4] = *b"DFS1";

/// Largest protocol id or payload accepted from the wire.
pub const MAX_FRAME_SECTION: usize = 32 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    OneWay = 0,
    Request = 1,
    Reply = 2,
}

impl FrameKind {
    fn from_byte(byte: u8) -> io::Result<Self> {
        match byte {
            0 => Ok(Self::OneWay),
            1 => Ok(Self::Request),
            2 => Ok(Self::Reply),
            other => Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown frame kind {other}"))),
        }
    }
}

/// Write one frame.
pub async fn write_frame<W>(writer: &mut W, kind: FrameKind, message: &NetworkMessage) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let protocol = message.protocol.as_bytes();
    let mut frame = Vec::with_capacity(4 + 1 + 8 + protocol.len() + message.payload.len());
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.push(kind as u8);
    frame.extend_from_slice(&section_len(protocol.len())?.to_be_bytes());
    frame.extend_from_slice(protocol);
    frame.extend_from_slice(&section_len(message.payload.len())?.to_be_bytes());
    frame.extend_from_slice(&message.payload);
    writer.write_all(&frame).await?;
    writer.flush().await
}

/// Read one frame.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<(FrameKind, NetworkMessage)>
where
    R: AsyncRead + Unpin,
{
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).await?;
    if magic != FRAME_MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad frame magic"));
    }
    let kind = FrameKind::from_byte(reader.read_u8().await?)?;
    let protocol = read_section(reader).await?;
    let payload = read_section(reader).await?;

    let protocol = String::from_utf8(protocol)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "protocol id is not UTF-8"))?;
    Ok((kind, NetworkMessage { protocol, payload }))
}

async fn read_section<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_SECTION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame section of {len} bytes exceeds limit"),
        ));
    }
    let mut section = vec![0u8; len];
    reader.read_exact(&mut section).await?;
    Ok(section)
}

fn section_len(len: usize) -> io::Result<u32> {
    if len > MAX_FRAME_SECTION {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "frame section too large"));
    }
    u32::try_from(len).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame section too large"))
}

/// `None` once an exchange on the stream was abandoned halfway.
type Connection = Arc<tokio::sync::Mutex<Option<TcpStream>>>;

/// TCP transport resolving wallet addresses through a static address book.
pub struct TcpPeerTransport {
    address_book: BTreeMap<String, SocketAddr>,
    connections: Mutex<HashMap<String, Connection>>,
}

impl TcpPeerTransport {
    pub fn new(address_book: BTreeMap<String, SocketAddr>) -> Self {
        Self {
            address_book,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Peers this transport can reach.
    pub fn known_peers(&self) -> Vec<String> {
        self.address_book.keys().cloned().collect()
    }

    /// Take exclusive use of the peer's stream for one frame exchange.
    async fn exchange<'a>(&'a self, peer: &'a str) -> Result<Exchange<'a>, BroadcastError> {
        let connection = self
            .connections
            .lock()
            .get(peer)
            .cloned()
            .ok_or_else(|| BroadcastError::transport(peer, "not connected"))?;
        let stream = Arc::clone(&connection).lock_owned().await;
        let mut exchange = Exchange {
            transport: self,
            peer,
            connection,
            stream,
            settled: false,
        };
        if exchange.stream.is_none() {
            // Closed by an abandoned exchange while this one waited.
            exchange.settled = true;
            self.forget(peer, &exchange.connection);
            return Err(BroadcastError::transport(peer, "connection closed"));
        }
        Ok(exchange)
    }

    /// Remove `connection` from the table unless it was already replaced.
    fn forget(&self, peer: &str, connection: &Connection) {
        let mut connections = self.connections.lock();
        if connections.get(peer).is_some_and(|current| Arc::ptr_eq(current, connection)) {
            connections.remove(peer);
        }
    }
}

/// One frame exchange holding the peer's stream.
///
/// Dropped before [`Exchange::settle`], whether through an I/O error or a
/// cancelled future, it closes the stream and forgets the connection. A
/// request cut off after its write would otherwise leave its reply queued
/// for the next request on the same socket.
struct Exchange<'a> {
    transport: &'a TcpPeerTransport,
    peer: &'a str,
    connection: Connection,
    stream: tokio::sync::OwnedMutexGuard<Option<TcpStream>>,
    settled: bool,
}

impl Exchange<'_> {
    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection closed"))
    }

    fn settle(mut self) {
        self.settled = true;
    }

    fn broken(&self, err: io::Error) -> BroadcastError {
        debug!(peer = self.peer, error = %err, "[broadcast] connection dropped");
        BroadcastError::transport(self.peer, err.to_string())
    }
}

impl Drop for Exchange<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        *self.stream = None;
        self.transport.forget(self.peer, &self.connection);
        debug!(peer = self.peer, "[broadcast] unfinished exchange, connection closed");
    }
}

#[async_trait]
impl PeerTransport for TcpPeerTransport {
    fn is_connected(&self, peer: &str) -> bool {
        self.connections.lock().contains_key(peer)
    }

    async fn connect(&self, peer: &str) -> Result<(), BroadcastError> {
        let addr = self
            .address_book
            .get(peer)
            .ok_or_else(|| BroadcastError::connect(peer, "no address known"))?;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| BroadcastError::connect(peer, format!("{addr}: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| BroadcastError::connect(peer, e.to_string()))?;

        self.connections
            .lock()
            .insert(peer.to_string(), Arc::new(tokio::sync::Mutex::new(Some(stream))));
        debug!(peer, %addr, "[broadcast] connected");
        Ok(())
    }

    async fn send(&self, peer: &str, message: &NetworkMessage) -> Result<(), BroadcastError> {
        let mut exchange = self.exchange(peer).await?;
        let written = match exchange.stream() {
            Ok(stream) => write_frame(&mut *stream, FrameKind::OneWay, message).await,
            Err(err) => Err(err),
        };
        written.map_err(|e| exchange.broken(e))?;
        exchange.settle();
        Ok(())
    }

    async fn request(&self, peer: &str, message: &NetworkMessage) -> Result<Vec<u8>, BroadcastError> {
        let mut exchange = self.exchange(peer).await?;
        let answered = match exchange.stream() {
            Ok(stream) => match write_frame(&mut *stream, FrameKind::Request, message).await {
                Ok(()) => read_frame(&mut *stream).await,
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };
        let (kind, reply) = answered.map_err(|e| exchange.broken(e))?;
        if kind != FrameKind::Reply {
            return Err(exchange.broken(io::Error::new(io::ErrorKind::InvalidData, "expected a reply frame")));
        }
        exchange.settle();
        Ok(reply.payload)
    }
}
