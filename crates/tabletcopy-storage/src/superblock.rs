//! Tablet superblock: the manifest of a tablet's on-disk blocks and files.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block::BlockId;
use crate::checksum::crc32;
use crate::error::{StorageError, StorageResult};

/// Superblock magic: "TBSB" = 0x54425342
pub const SUPERBLOCK_MAGIC: u32 = 0x54425342;
/// Current superblock version
pub const SUPERBLOCK_VERSION: u8 = 1;

/// Lifecycle state of a tablet's local data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TabletDataState {
    /// Data is complete and the replica may serve.
    #[default]
    Ready,
    /// A copy from a remote peer is being installed.
    Copying,
    /// Data was removed; only the record that the tablet existed is kept.
    Tombstoned,
    /// The tablet was deleted outright.
    Deleted,
}

impl fmt::Display for TabletDataState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TabletDataState::Ready => write!(f, "READY"),
            TabletDataState::Copying => write!(f, "COPYING"),
            TabletDataState::Tombstoned => write!(f, "TOMBSTONED"),
            TabletDataState::Deleted => write!(f, "DELETED"),
        }
    }
}

/// A row set and the data blocks that make it up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSetMeta {
    /// Row set identifier, stable across copies.
    pub id: u64,
    /// Data blocks in column order.
    pub blocks: Vec<BlockId>,
}

/// A storage-engine file belonging to the tablet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageFileMeta {
    /// File name relative to the tablet data directory.
    pub name: String,
    /// Size in bytes.
    pub size_bytes: u64,
}

/// Manifest of everything a tablet keeps on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletSuperblock {
    /// Magic number for identification
    pub magic: u32,
    /// Version of the superblock format
    pub version: u8,
    /// Tablet identifier
    pub tablet_id: String,
    /// Identifier of the table this tablet belongs to
    pub table_id: String,
    /// Human-readable table name
    pub table_name: String,
    /// Current lifecycle state of the local data
    pub data_state: TabletDataState,
    /// Row sets and their data blocks
    pub rowsets: Vec<RowSetMeta>,
    /// Storage-engine files
    pub storage_files: Vec<StorageFileMeta>,
    /// Directory holding the tablet's WAL segments
    pub wal_dir: String,
    /// Directory holding the tablet's storage-engine files
    pub data_dir: String,
    /// Last logged index when the tablet was tombstoned
    pub tombstone_last_logged_index: Option<u64>,
    /// CRC32 of the serialized superblock (computed with this field zeroed)
    pub checksum: u32,
}

impl TabletSuperblock {
    /// Creates an empty superblock in the `Ready` state.
    pub fn new(tablet_id: &str, table_id: &str, table_name: &str) -> Self {
        Self {
            magic: SUPERBLOCK_MAGIC,
            version: SUPERBLOCK_VERSION,
            tablet_id: tablet_id.to_string(),
            table_id: table_id.to_string(),
            table_name: table_name.to_string(),
            data_state: TabletDataState::Ready,
            rowsets: Vec::new(),
            storage_files: Vec::new(),
            wal_dir: String::new(),
            data_dir: String::new(),
            tombstone_last_logged_index: None,
            checksum: 0,
        }
    }

    /// Every block referenced by the superblock, in row set order.
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.rowsets
            .iter()
            .flat_map(|rs| rs.blocks.iter().copied())
            .collect()
    }

    /// Number of blocks referenced by the superblock.
    pub fn num_blocks(&self) -> usize {
        self.rowsets.iter().map(|rs| rs.blocks.len()).sum()
    }

    /// Total size of the storage-engine files.
    pub fn storage_files_size(&self) -> u64 {
        self.storage_files.iter().map(|f| f.size_bytes).sum()
    }

    /// Validates the superblock magic, version, and checksum.
    pub fn validate(&self) -> StorageResult<()> {
        if self.magic != SUPERBLOCK_MAGIC {
            return Err(StorageError::CorruptedSuperblock {
                reason: format!(
                    "invalid magic: expected {:#x}, got {:#x}",
                    SUPERBLOCK_MAGIC, self.magic
                ),
            });
        }

        if self.version != SUPERBLOCK_VERSION {
            return Err(StorageError::CorruptedSuperblock {
                reason: format!(
                    "unsupported version: expected {}, got {}",
                    SUPERBLOCK_VERSION, self.version
                ),
            });
        }

        let computed_checksum = self.compute_checksum()?;
        if computed_checksum != self.checksum {
            debug!(
                tablet_id = %self.tablet_id,
                expected = self.checksum,
                actual = computed_checksum,
                "superblock checksum mismatch"
            );
            return Err(StorageError::ChecksumMismatch {
                what: format!("superblock of tablet {}", self.tablet_id),
                expected: self.checksum as u64,
                actual: computed_checksum as u64,
            });
        }

        Ok(())
    }

    /// Computes the CRC32 of the superblock bytes (excluding the checksum field).
    pub fn compute_checksum(&self) -> StorageResult<u32> {
        let mut unsealed = self.clone();
        unsealed.checksum = 0;
        let bytes = bincode::serialize(&unsealed).map_err(|e| StorageError::SerializationError {
            reason: e.to_string(),
        })?;
        Ok(crc32(&bytes))
    }

    /// Recomputes and stores the checksum.
    pub fn update_checksum(&mut self) -> StorageResult<()> {
        self.checksum = self.compute_checksum()?;
        Ok(())
    }

    /// Seals and serializes the superblock.
    pub fn to_bytes(&self) -> StorageResult<Vec<u8>> {
        let mut sealed = self.clone();
        sealed.update_checksum()?;
        bincode::serialize(&sealed).map_err(|e| StorageError::SerializationError {
            reason: e.to_string(),
        })
    }

    /// Deserializes and validates a superblock.
    pub fn from_bytes(data: &[u8]) -> StorageResult<Self> {
        let superblock: TabletSuperblock =
            bincode::deserialize(data).map_err(|e| StorageError::CorruptedSuperblock {
                reason: format!("deserialization failed: {}", e),
            })?;
        superblock.validate()?;
        Ok(superblock)
    }
}
