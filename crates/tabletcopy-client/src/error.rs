//! Error types for the remote bootstrap client.

use std::fmt;

use thiserror::Error;

use tabletcopy_consensus::ConsensusError;
use tabletcopy_storage::StorageError;
use tabletcopy_transport::{RpcErrorCode, TransportError};

use crate::messages::{decode, RemoteBootstrapErrorCode, RemoteBootstrapErrorPb};

/// Terminal classification of a failed copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The tablet, a data item or a local record does not exist.
    NotFound,
    /// A caller-supplied value was rejected.
    InvalidArgument,
    /// Received data failed verification.
    DataCorruption,
    /// The remote peer could not be reached or failed.
    RemoteUnavailable,
    /// A local disk operation failed.
    IoFailure,
    /// The operation was already performed on this session.
    AlreadyInProgress,
    /// A protocol precondition does not hold.
    IllegalState,
    /// The copy was cancelled.
    Aborted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::DataCorruption => "data corruption",
            ErrorKind::RemoteUnavailable => "remote unavailable",
            ErrorKind::IoFailure => "I/O failure",
            ErrorKind::AlreadyInProgress => "already in progress",
            ErrorKind::IllegalState => "illegal state",
            ErrorKind::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Errors returned by the remote bootstrap client.
#[derive(Debug, Error)]
pub enum CopyError {
    /// Something the copy needs does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A caller-supplied value was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Received data failed verification.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The remote peer could not be reached or failed to serve a call.
    #[error("remote unavailable: {message}")]
    RemoteUnavailable {
        /// What was being attempted.
        message: String,
        /// Underlying transport failure.
        #[source]
        source: Option<TransportError>,
    },

    /// A local disk operation failed.
    #[error("I/O failure: {0}")]
    IoFailure(#[from] StorageError),

    /// The operation was already performed on this session.
    #[error("already in progress: {0}")]
    AlreadyInProgress(String),

    /// A protocol precondition does not hold.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The copy was cancelled.
    #[error("aborted: {0}")]
    Aborted(String),
}

/// Result alias for the client.
pub type CopyResult<T> = Result<T, CopyError>;

impl CopyError {
    /// Terminal classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CopyError::NotFound(_) => ErrorKind::NotFound,
            CopyError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CopyError::DataCorruption(_) => ErrorKind::DataCorruption,
            CopyError::RemoteUnavailable { .. } => ErrorKind::RemoteUnavailable,
            CopyError::IoFailure(_) => ErrorKind::IoFailure,
            CopyError::AlreadyInProgress(_) => ErrorKind::AlreadyInProgress,
            CopyError::IllegalState(_) => ErrorKind::IllegalState,
            CopyError::Aborted(_) => ErrorKind::Aborted,
        }
    }

    /// Reclassifies a failed call to the remote service.
    ///
    /// A service error record embedded in the transport's error envelope
    /// decides the kind; any other failure is `RemoteUnavailable`.
    pub fn from_remote(context: &str, err: TransportError) -> CopyError {
        let pb = match &err {
            TransportError::Remote(status) if status.code == RpcErrorCode::ApplicationError => status
                .app_error
                .as_deref()
                .and_then(|bytes| decode::<RemoteBootstrapErrorPb>(bytes).ok()),
            _ => None,
        };
        let Some(pb) = pb else {
            return CopyError::RemoteUnavailable {
                message: format!("{}: {}", context, err),
                source: Some(err),
            };
        };
        let message = format!("{}: {}", context, pb.message);
        match pb.code {
            RemoteBootstrapErrorCode::TabletNotFound
            | RemoteBootstrapErrorCode::BlockNotFound
            | RemoteBootstrapErrorCode::WalSegmentNotFound
            | RemoteBootstrapErrorCode::StorageFileNotFound => CopyError::NotFound(message),
            RemoteBootstrapErrorCode::InvalidRemoteBootstrapRequest => CopyError::InvalidArgument(message),
            RemoteBootstrapErrorCode::NoSession
            | RemoteBootstrapErrorCode::IoError
            | RemoteBootstrapErrorCode::UnknownError => CopyError::RemoteUnavailable {
                message,
                source: Some(err),
            },
        }
    }
}

impl From<ConsensusError> for CopyError {
    fn from(e: ConsensusError) -> Self {
        match e {
            ConsensusError::NotFound(m) => CopyError::NotFound(m),
            ConsensusError::InvalidArgument(m) => CopyError::InvalidArgument(m),
            ConsensusError::IllegalState(m) => CopyError::IllegalState(m),
            ConsensusError::Corruption(m) => CopyError::DataCorruption(m),
            ConsensusError::PeerError(m) => CopyError::RemoteUnavailable {
                message: m,
                source: None,
            },
            ConsensusError::Storage(e) => CopyError::IoFailure(e),
        }
    }
}
