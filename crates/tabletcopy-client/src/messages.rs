//! Wire messages of the remote bootstrap service.
//!
//! Messages are bincode-encoded into frame payloads. Service failures travel
//! inside the transport's error envelope as an encoded
//! [`RemoteBootstrapErrorPb`].

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use tabletcopy_consensus::ConsensusState;
use tabletcopy_storage::{BlockId, Checksum, TabletSuperblock};
use tabletcopy_transport::TransportError;

/// Opens a copy session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginSessionRequest {
    /// Uuid of the server that wants the copy.
    pub requestor_uuid: String,
    /// Tablet to copy.
    pub tablet_id: String,
}

/// Everything the client needs to know to pull a tablet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginSessionResponse {
    /// Token naming the session in later calls.
    pub session_id: String,
    /// The remote ends the session if no call arrives within this period.
    pub session_idle_timeout_millis: u64,
    /// Remote superblock describing the data to copy.
    pub superblock: TabletSuperblock,
    /// Remote committed consensus state at session start.
    pub initial_committed_cstate: ConsensusState,
    /// WAL segments to copy, in order.
    pub wal_segment_seqnos: Vec<u64>,
    /// Largest chunk the remote will serve; 0 means no limit.
    pub max_chunk_size: u64,
}

/// Names one data item of the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataId {
    /// A WAL segment.
    WalSegment {
        /// Segment sequence number.
        seqno: u64,
    },
    /// A data block, by its id on the remote.
    Block {
        /// Remote block id.
        id: BlockId,
    },
    /// A storage-engine file.
    StorageFile {
        /// File name relative to the tablet's data directory.
        name: String,
    },
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataId::WalSegment { seqno } => write!(f, "WAL segment {}", seqno),
            DataId::Block { id } => write!(f, "block {}", id),
            DataId::StorageFile { name } => write!(f, "storage file {}", name),
        }
    }
}

/// Asks for the bytes of `data_id` starting at `offset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchDataRequest {
    /// Session token.
    pub session_id: String,
    /// Item to read.
    pub data_id: DataId,
    /// First byte to return.
    pub offset: u64,
    /// Upper bound on the returned length; 0 lets the remote choose.
    pub max_length: u64,
}

/// A slice of a data item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataChunk {
    /// Offset of `data` within the item.
    pub offset: u64,
    /// Chunk bytes.
    pub data: Vec<u8>,
    /// Checksum of `data`.
    pub checksum: Checksum,
    /// Length of the whole item.
    pub total_data_length: u64,
}

/// Response to [`FetchDataRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchDataResponse {
    /// Returned chunk.
    pub chunk: DataChunk,
}

/// Closes a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndSessionRequest {
    /// Session token.
    pub session_id: String,
    /// Whether the copy was installed.
    pub is_success: bool,
}

/// Response to [`EndSessionRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndSessionResponse {}

/// Service error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteBootstrapErrorCode {
    /// Unclassified failure.
    UnknownError,
    /// The session token is unknown or expired.
    NoSession,
    /// The remote does not host the tablet.
    TabletNotFound,
    /// A requested block does not exist.
    BlockNotFound,
    /// A requested WAL segment does not exist.
    WalSegmentNotFound,
    /// A requested storage-engine file does not exist.
    StorageFileNotFound,
    /// The request was malformed.
    InvalidRemoteBootstrapRequest,
    /// The remote failed to read its own data.
    IoError,
}

/// Service error record carried as the transport error's application payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBootstrapErrorPb {
    /// Error code.
    pub code: RemoteBootstrapErrorCode,
    /// Human-readable description.
    pub message: String,
}

impl RemoteBootstrapErrorPb {
    /// Creates an error record.
    pub fn new(code: RemoteBootstrapErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Encodes a message for a frame payload.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, TransportError> {
    Ok(bincode::serialize(msg)?)
}

/// Decodes a message from a frame payload.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, TransportError> {
    Ok(bincode::deserialize(payload)?)
}
