//! Framed TCP connections.

use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::protocol::{Frame, FrameHeader, FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// TCP transport configuration.
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Whether to enable TCP_NODELAY.
    pub nodelay: bool,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            nodelay: true,
        }
    }
}

/// Dials and accepts framed connections.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    config: TcpTransportConfig,
}

impl TcpTransport {
    /// Creates a transport with the given configuration.
    pub fn new(config: TcpTransportConfig) -> Self {
        Self { config }
    }

    /// Connects to `addr`, bounded by the connect timeout.
    pub async fn connect(&self, addr: &str) -> Result<TcpConnection> {
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::ConnectionTimeout {
                addr: addr.to_string(),
                timeout_ms: self.config.connect_timeout_ms,
            })?
            .map_err(|e| match e.kind() {
                ErrorKind::ConnectionRefused => TransportError::ConnectionRefused {
                    addr: addr.to_string(),
                },
                _ => TransportError::IoError(e),
            })?;
        if self.config.nodelay {
            stream.set_nodelay(true)?;
        }
        debug!(addr, "tcp connected");
        TcpConnection::from_stream(stream)
    }

    /// Binds a listener.
    pub async fn listen(&self, addr: &str) -> Result<TcpListener> {
        Ok(TcpListener::bind(addr).await?)
    }

    /// Accepts one connection from `listener`.
    pub async fn accept(&self, listener: &TcpListener) -> Result<TcpConnection> {
        let (stream, _) = listener.accept().await?;
        if self.config.nodelay {
            stream.set_nodelay(true)?;
        }
        TcpConnection::from_stream(stream)
    }
}

/// A TCP connection that can send and receive frames concurrently.
pub struct TcpConnection {
    read: Mutex<OwnedReadHalf>,
    write: Mutex<OwnedWriteHalf>,
    peer_addr: String,
}

impl TcpConnection {
    pub(crate) fn from_stream(stream: TcpStream) -> Result<Self> {
        let peer_addr = stream.peer_addr()?.to_string();
        let (read, write) = stream.into_split();
        Ok(Self {
            read: Mutex::new(read),
            write: Mutex::new(write),
            peer_addr,
        })
    }

    /// Writes one frame.
    pub async fn send_frame(&self, frame: &Frame) -> Result<()> {
        let encoded = frame.encode();
        let mut write = self.write.lock().await;
        write.write_all(&encoded).await?;
        write.flush().await?;
        Ok(())
    }

    /// Reads one frame. A clean close before a header yields `ConnectionReset`.
    pub async fn recv_frame(&self) -> Result<Frame> {
        let mut read = self.read.lock().await;
        let mut header_buf = [0u8; FRAME_HEADER_SIZE];
        read.read_exact(&mut header_buf).await.map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => TransportError::ConnectionReset,
            _ => TransportError::IoError(e),
        })?;
        let header = FrameHeader::decode(&header_buf)?;
        if header.payload_length > MAX_PAYLOAD_SIZE {
            return Err(TransportError::PayloadTooLarge {
                size: header.payload_length,
                max_size: MAX_PAYLOAD_SIZE,
            });
        }
        let mut payload = vec![0u8; header.payload_length as usize];
        if !payload.is_empty() {
            read.read_exact(&mut payload).await?;
        }
        let frame = Frame { header, payload };
        frame.validate()?;
        Ok(frame)
    }

    /// Remote address.
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
