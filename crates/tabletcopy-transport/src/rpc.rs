//! Request/response calls over a framed TCP connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::error::{Result, RpcErrorCode, RpcErrorStatus, TransportError};
use crate::protocol::{Frame, FrameFlags, Opcode};
use crate::tcp::TcpConnection;

/// Configuration for RPC client.
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Response timeout in milliseconds (default: 30000).
    pub response_timeout_ms: u64,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 30_000,
        }
    }
}

/// Serves incoming requests.
#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    /// Handles one request and returns the response payload or an error envelope.
    async fn handle(&self, opcode: Opcode, payload: Vec<u8>) -> std::result::Result<Vec<u8>, RpcErrorStatus>;
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Frame>>>>;

/// Client side of an RPC connection.
///
/// Calls may be issued concurrently; a background task reads responses and
/// hands each one to the caller waiting on its request id.
pub struct RpcClient {
    conn: Arc<TcpConnection>,
    config: RpcClientConfig,
    next_id: AtomicU64,
    pending: PendingMap,
    reader: tokio::task::JoinHandle<()>,
}

impl RpcClient {
    /// Wraps a connection and starts the response reader.
    pub fn new(conn: Arc<TcpConnection>, config: RpcClientConfig) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_conn = conn.clone();
        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            loop {
                match reader_conn.recv_frame().await {
                    Ok(frame) => {
                        let request_id = frame.request_id();
                        let tx = reader_pending.lock().await.remove(&request_id);
                        match tx {
                            Some(tx) => {
                                let _ = tx.send(frame);
                            }
                            None => debug!(request_id, "dropping response for unknown request"),
                        }
                    }
                    Err(e) => {
                        debug!(peer = reader_conn.peer_addr(), error = %e, "rpc reader stopped");
                        // Dropping the senders fails every outstanding call.
                        reader_pending.lock().await.clear();
                        break;
                    }
                }
            }
        });
        Self {
            conn,
            config,
            next_id: AtomicU64::new(1),
            pending,
            reader,
        }
    }

    /// Sends a request and waits for its response payload.
    ///
    /// An error response is returned as [`TransportError::Remote`].
    pub async fn call(&self, opcode: Opcode, payload: Vec<u8>) -> Result<Vec<u8>> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::new(opcode, request_id, payload);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);
        if let Err(e) = self.conn.send_frame(&frame).await {
            self.pending.lock().await.remove(&request_id);
            return Err(e);
        }

        let timeout = Duration::from_millis(self.config.response_timeout_ms);
        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(TransportError::ConnectionReset),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                return Err(TransportError::RequestTimeout {
                    request_id,
                    timeout_ms: self.config.response_timeout_ms,
                });
            }
        };
        if response.is_error() {
            let status: RpcErrorStatus = bincode::deserialize(&response.payload)?;
            return Err(TransportError::Remote(status));
        }
        Ok(response.payload)
    }

    /// Sends a message without waiting for a response.
    pub async fn call_one_way(&self, opcode: Opcode, payload: Vec<u8>) -> Result<()> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::with_flags(opcode, request_id, payload, FrameFlags::ONE_WAY);
        self.conn.send_frame(&frame).await
    }

    /// Remote address.
    pub fn peer_addr(&self) -> &str {
        self.conn.peer_addr()
    }

    /// Stops the response reader.
    pub fn shutdown(&self) {
        self.reader.abort();
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Accept loop dispatching requests to a handler.
pub struct RpcServer;

impl RpcServer {
    /// Serves connections from `listener` until accepting fails. Each
    /// connection runs in its own task and handles requests in order.
    pub async fn serve(listener: TcpListener, handler: Arc<dyn RpcHandler>) -> Result<()> {
        loop {
            let (stream, peer_addr) = listener.accept().await?;
            debug!(peer = %peer_addr, "accepted connection");
            let handler = handler.clone();
            tokio::spawn(async move {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(peer = %peer_addr, error = %e, "failed to set nodelay");
                }
                let conn = match TcpConnection::from_stream(stream) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(error = %e, "failed to set up connection");
                        return;
                    }
                };
                serve_connection(conn, handler).await;
            });
        }
    }
}

async fn serve_connection(conn: TcpConnection, handler: Arc<dyn RpcHandler>) {
    loop {
        let frame = match conn.recv_frame().await {
            Ok(f) => f,
            Err(e) => {
                debug!(peer = conn.peer_addr(), error = %e, "connection closed");
                return;
            }
        };
        let one_way = frame.header.flags.contains(FrameFlags::ONE_WAY);
        let response = match handler.handle(frame.opcode(), frame.payload.clone()).await {
            Ok(payload) => frame.make_response(payload),
            Err(status) => {
                debug!(opcode = ?frame.opcode(), code = %status.code, message = %status.message, "request failed");
                match bincode::serialize(&status) {
                    Ok(payload) => frame.make_error_response(payload),
                    Err(e) => {
                        warn!(error = %e, "failed to encode error status");
                        let fallback = RpcErrorStatus::new(RpcErrorCode::Internal, e.to_string());
                        frame.make_error_response(bincode::serialize(&fallback).unwrap_or_default())
                    }
                }
            }
        };
        if one_way {
            continue;
        }
        if let Err(e) = conn.send_frame(&response).await {
            warn!(peer = conn.peer_addr(), error = %e, "failed to send response");
            return;
        }
    }
}
