use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of an error reported by the remote side of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcErrorCode {
    /// The service rejected the request; details are in the application payload.
    ApplicationError,
    /// The request could not be decoded or names an unknown operation.
    InvalidRequest,
    /// The server is overloaded; the request was not executed.
    ServerTooBusy,
    /// The server failed while executing the request.
    Internal,
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RpcErrorCode::ApplicationError => "APPLICATION_ERROR",
            RpcErrorCode::InvalidRequest => "INVALID_REQUEST",
            RpcErrorCode::ServerTooBusy => "SERVER_TOO_BUSY",
            RpcErrorCode::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

/// Error envelope carried in the payload of an `ERROR` response frame.
///
/// `app_error` holds a service-specific error record, opaque to the
/// transport, that the caller decodes to reclassify the failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorStatus {
    /// Transport-level classification.
    pub code: RpcErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Encoded service error, if the service supplied one.
    pub app_error: Option<Vec<u8>>,
}

impl RpcErrorStatus {
    /// An error without an application payload.
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            app_error: None,
        }
    }

    /// An application error carrying an encoded service error.
    pub fn application(message: impl Into<String>, app_error: Vec<u8>) -> Self {
        Self {
            code: RpcErrorCode::ApplicationError,
            message: message.into(),
            app_error: Some(app_error),
        }
    }
}

impl fmt::Display for RpcErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Errors raised by the framed RPC transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer refused the connection.
    #[error("connection refused to {addr}")]
    ConnectionRefused {
        /// Address that was dialled.
        addr: String,
    },

    /// Establishing the connection took too long.
    #[error("connection timeout after {timeout_ms}ms to {addr}")]
    ConnectionTimeout {
        /// Address that was dialled.
        addr: String,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// The connection was closed while a call was outstanding.
    #[error("connection reset by peer")]
    ConnectionReset,

    /// A frame was malformed.
    #[error("invalid frame: {reason}")]
    InvalidFrame {
        /// What was wrong with the frame.
        reason: String,
    },

    /// A frame did not start with the protocol magic.
    #[error("invalid magic number: expected 0x{expected:08X}, got 0x{got:08X}")]
    InvalidMagic {
        /// Expected magic.
        expected: u32,
        /// Received magic.
        got: u32,
    },

    /// The peer speaks another protocol version.
    #[error("protocol version mismatch: expected {expected}, got {got}")]
    VersionMismatch {
        /// Our version.
        expected: u8,
        /// Peer's version.
        got: u8,
    },

    /// A frame payload did not match its CRC.
    #[error("checksum mismatch: expected 0x{expected:08X}, computed 0x{computed:08X}")]
    ChecksumMismatch {
        /// CRC in the header.
        expected: u32,
        /// CRC of the received payload.
        computed: u32,
    },

    /// A frame exceeded the maximum payload size.
    #[error("payload too large: {size} bytes (max {max_size})")]
    PayloadTooLarge {
        /// Announced size.
        size: u32,
        /// Maximum accepted size.
        max_size: u32,
    },

    /// No response arrived in time.
    #[error("request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Id of the request.
        request_id: u64,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// A frame carried an opcode this build does not know.
    #[error("unknown opcode: 0x{0:04X}")]
    UnknownOpcode(u16),

    /// No connection is available.
    #[error("not connected")]
    NotConnected,

    /// A message could not be encoded or decoded.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The remote side answered with an error envelope.
    #[error("remote error: {0}")]
    Remote(RpcErrorStatus),

    /// Socket I/O failed.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

impl From<bincode::Error> for TransportError {
    fn from(e: bincode::Error) -> Self {
        TransportError::SerializationError(e.to_string())
    }
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
