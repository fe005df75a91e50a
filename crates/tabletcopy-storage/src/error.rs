//! Error types for the storage subsystem.

use std::path::PathBuf;

use thiserror::Error;

use crate::block::BlockId;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error variants for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The requested block does not exist.
    #[error("Block not found: {block_id}")]
    BlockNotFound {
        /// The block ID that was not found.
        block_id: BlockId,
    },

    /// A block with this ID already exists on disk.
    #[error("Block already exists: {block_id}")]
    BlockExists {
        /// The conflicting block ID.
        block_id: BlockId,
    },

    /// Tablet metadata or another on-disk record does not exist.
    #[error("Not found: {path}")]
    NotFound {
        /// Path of the missing record.
        path: PathBuf,
    },

    /// Data corruption detected: checksum mismatch.
    #[error("Checksum mismatch on {what}: expected {expected:#x}, actual {actual:#x}")]
    ChecksumMismatch {
        /// Description of the checked item.
        what: String,
        /// The expected checksum value.
        expected: u64,
        /// The actual checksum value.
        actual: u64,
    },

    /// Superblock is corrupted or invalid.
    #[error("Corrupted superblock: {reason}")]
    CorruptedSuperblock {
        /// Description of the corruption.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {reason}")]
    SerializationError {
        /// Description of the error.
        reason: String,
    },

    /// The sink was already closed and cannot accept more data.
    #[error("Sink already closed: {path}")]
    SinkClosed {
        /// Path of the closed file.
        path: PathBuf,
    },

    /// A file name is not acceptable as a local storage file name.
    #[error("Invalid file name: {name:?}")]
    InvalidFileName {
        /// The rejected name.
        name: String,
    },
}

impl StorageError {
    /// Returns true when the error reports a missing record or block.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound { .. } | StorageError::BlockNotFound { .. } => true,
            StorageError::IoError(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
