//! Transport binding for channel sessions.
//!
//! A binding wraps a connected duplex byte stream and hands out whole
//! OpenFlow frames, delimited by the length field of the frame header.
//! Streams come either from an acceptor (already connected) or from
//! [`dial`], which opens an outbound TCP connection.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use ofchannel_core::{frame_length, OFP_HEADER_LEN};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::TransportError;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Transport trait for exchanging OpenFlow frames with one peer.
///
/// The session that owns a binding is its only reader and writer.
#[async_trait]
pub trait Transport: Send {
    /// Write one encoded frame.
    async fn send(&mut self, frame: Bytes) -> Result<()>;

    /// Receive the next complete frame.
    ///
    /// Suspends until a frame is available or the connection ends. Returns
    /// `PeerClosed` when the remote end hangs up between frames.
    ///
    /// Must be cancel safe: dropping the future before it completes loses no
    /// bytes, so it can be raced against other events.
    async fn receive(&mut self) -> Result<Bytes>;

    /// Release the connection. Idempotent.
    async fn close(&mut self);

    /// Label of the remote endpoint, when known.
    fn peer_label(&self) -> Option<String>;
}

/// How an outbound connection is established.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Plain TCP (default).
    #[default]
    Tcp,
    /// TLS over TCP. Not dialed here; wrap the stream yourself and bind it.
    Tls,
}

impl TransportKind {
    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Tls => "tls",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "tls" | "ssl" => Ok(Self::Tls),
            _ => Err(format!("Unknown transport kind: {}", s)),
        }
    }
}

/// Address of a controller to dial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePeer {
    /// Host name or IP address.
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub kind: TransportKind,
}

impl RemotePeer {
    /// Plain TCP peer.
    pub fn tcp(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            kind: TransportKind::Tcp,
        }
    }
}

impl fmt::Display for RemotePeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.kind, self.address, self.port)
    }
}

/// Frame-oriented binding over any async byte stream.
pub struct StreamTransport<S> {
    stream: S,
    buffer: BytesMut,
    peer: Option<String>,
    closed: bool,
}

/// Wrap an already-connected stream.
pub fn bind_accepted<S>(stream: S) -> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    StreamTransport::new(stream, None)
}

/// Wrap an accepted TCP connection, labelling it with the peer address.
pub fn bind_tcp(stream: TcpStream) -> StreamTransport<TcpStream> {
    let peer = stream.peer_addr().ok().map(|addr| addr.to_string());
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Could not set TCP_NODELAY: {}", e);
    }
    StreamTransport::new(stream, peer)
}

/// Open an outbound connection to `peer`.
///
/// Fails with `Connect` on refusal or when `connect_timeout` elapses. Never
/// retries.
pub async fn dial(peer: &RemotePeer, connect_timeout: Duration) -> Result<StreamTransport<TcpStream>> {
    if peer.kind != TransportKind::Tcp {
        return Err(TransportError::Unsupported(peer.kind));
    }

    let address = format!("{}:{}", peer.address, peer.port);
    let connect = TcpStream::connect((peer.address.as_str(), peer.port));
    match tokio::time::timeout(connect_timeout, connect).await {
        Ok(Ok(stream)) => {
            tracing::debug!("Connected to {}", address);
            Ok(bind_tcp(stream))
        }
        Ok(Err(e)) => Err(TransportError::Connect {
            address,
            reason: e.to_string(),
        }),
        Err(_) => Err(TransportError::Connect {
            address,
            reason: format!("timed out after {:?}", connect_timeout),
        }),
    }
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a binding with an optional peer label.
    pub fn new(stream: S, peer: Option<String>) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
            peer,
            closed: false,
        }
    }

    /// Whether [`Transport::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Split a complete frame off the read buffer, if one is there.
    fn take_frame(&mut self) -> Result<Option<Bytes>> {
        if self.buffer.len() < OFP_HEADER_LEN {
            return Ok(None);
        }
        let mut header = [0u8; OFP_HEADER_LEN];
        header.copy_from_slice(&self.buffer[..OFP_HEADER_LEN]);
        let length = frame_length(&header).map_err(|_| {
            TransportError::FrameTooShort(u16::from_be_bytes([header[2], header[3]]) as usize)
        })?;

        if self.buffer.len() < length {
            self.buffer.reserve(length - self.buffer.len());
            return Ok(None);
        }
        Ok(Some(self.buffer.split_to(length).freeze()))
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frame: Bytes) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.stream
            .write_all(&frame)
            .await
            .map_err(TransportError::from_io)?;
        self.stream.flush().await.map_err(TransportError::from_io)
    }

    async fn receive(&mut self) -> Result<Bytes> {
        loop {
            if self.closed {
                return Err(TransportError::Closed);
            }
            if let Some(frame) = self.take_frame()? {
                return Ok(frame);
            }
            // read_buf keeps partial data in self.buffer if this future is dropped
            let read = self
                .stream
                .read_buf(&mut self.buffer)
                .await
                .map_err(TransportError::from_io)?;
            if read == 0 {
                if self.buffer.is_empty() {
                    return Err(TransportError::PeerClosed);
                }
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("peer closed with {} bytes of a partial frame", self.buffer.len()),
                )));
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!("Error shutting down transport: {}", e);
        }
    }

    fn peer_label(&self) -> Option<String> {
        self.peer.clone()
    }
}

/// In-memory transports for tests.
///
/// Uses a tokio duplex pipe, so the byte-level behaviour (framing, partial
/// reads, EOF) is the same as for sockets.
pub mod memory {
    use super::*;
    use tokio::io::DuplexStream;

    /// Pipe capacity for each direction.
    const PIPE_CAPACITY: usize = 64 * 1024;

    /// In-memory transport implementation.
    pub type MemoryTransport = StreamTransport<DuplexStream>;

    /// Create two connected transports.
    pub fn pair() -> (MemoryTransport, MemoryTransport) {
        let (a, b) = tokio::io::duplex(PIPE_CAPACITY);
        (
            StreamTransport::new(a, Some("memory:b".into())),
            StreamTransport::new(b, Some("memory:a".into())),
        )
    }
}
