#![warn(missing_docs)]

//! tabletcopy transport subsystem: framed binary RPC over TCP
//!
//! Requests and responses travel as CRC-checked frames. An [`RpcClient`]
//! multiplexes concurrent calls over one connection; failed calls come back as
//! [`TransportError::Remote`] carrying an [`RpcErrorStatus`] whose optional
//! application payload is decoded by the service client.

pub mod error;
pub mod protocol;
pub mod retry;
pub mod rpc;
pub mod tcp;

pub use error::{Result, RpcErrorCode, RpcErrorStatus, TransportError};
pub use protocol::{Frame, FrameFlags, FrameHeader, Opcode, FRAME_HEADER_SIZE, MAGIC, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
pub use retry::{is_retryable, RetryConfig, RetryExecutor, RetryOutcome};
pub use rpc::{RpcClient, RpcClientConfig, RpcHandler, RpcServer};
pub use tcp::{TcpConnection, TcpTransport, TcpTransportConfig};
