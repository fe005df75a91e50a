use serde::{Deserialize, Serialize};
use std::fmt;

use tabletcopy_storage::StorageError;

/// Permanent identifier of a server taking part in consensus
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a new NodeId from its permanent uuid string
    pub fn new(uuid: impl Into<String>) -> Self {
        NodeId(uuid.into())
    }

    /// Returns the uuid string of this node
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

/// Represents a Raft term number for leader election
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Term(u64);

impl Term {
    /// Creates a new Term from a raw u64 value
    pub fn new(t: u64) -> Self {
        Term(t)
    }

    /// Returns the raw u64 value of this term
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a Raft log index
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogIndex(u64);

impl LogIndex {
    /// A zero log index
    pub const ZERO: LogIndex = LogIndex(0);

    /// Creates a new LogIndex from a raw u64 value
    pub fn new(i: u64) -> Self {
        LogIndex(i)
    }

    /// Returns the raw u64 value of this log index
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LogIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an operation in the replicated log
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId {
    /// Term in which the operation was appended
    pub term: Term,
    /// Index of the operation
    pub index: LogIndex,
}

impl OpId {
    /// Creates an OpId from raw term and index values
    pub fn new(term: u64, index: u64) -> Self {
        Self {
            term: Term::new(term),
            index: LogIndex::new(index),
        }
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.term, self.index)
    }
}

/// Result type alias for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Errors surfaced by the consensus collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    /// A consensus record or peer does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A caller-supplied value is not acceptable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The consensus state does not permit the operation yet.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A persisted record failed validation.
    #[error("corrupted consensus metadata: {0}")]
    Corruption(String),

    /// A remote peer could not be reached or created.
    #[error("peer error: {0}")]
    PeerError(String),

    /// The local storage layer failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
