//! File-per-block manager.
//!
//! Every block lives in its own file named after its [`BlockId`] inside a
//! single directory. Identifiers are allocated from a counter seeded past the
//! highest identifier already on disk, so a fresh id never collides with an
//! existing block, including blocks still referenced by a tombstoned tablet.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::block::BlockId;
use crate::error::{StorageError, StorageResult};
use crate::sink::{DurableFile, WritableSink, WriteOptions};

/// Manages data blocks stored as individual files.
#[derive(Debug)]
pub struct FileBlockManager {
    dir: PathBuf,
    next_id: AtomicU64,
}

impl FileBlockManager {
    /// Opens (creating if needed) the block directory at `dir`.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        std::fs::create_dir_all(dir)?;
        let mut max_id = 0u64;
        let mut count = 0usize;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(|n| n.parse::<BlockId>().ok()) {
                max_id = max_id.max(id.as_u64());
                count += 1;
            }
        }
        info!(dir = %dir.display(), blocks = count, next_id = max_id + 1, "opened block manager");
        Ok(Self {
            dir: dir.to_path_buf(),
            next_id: AtomicU64::new(max_id + 1),
        })
    }

    /// Directory holding the block files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserves a fresh block identifier.
    pub fn allocate_block_id(&self) -> BlockId {
        BlockId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a new, empty block under a freshly allocated identifier.
    pub fn create_block(&self, options: WriteOptions) -> StorageResult<WritableBlock> {
        let id = self.allocate_block_id();
        let path = self.block_path(id);
        let file = DurableFile::create_new(&path, options).map_err(|e| match e {
            StorageError::IoError(io) if io.kind() == std::io::ErrorKind::AlreadyExists => {
                StorageError::BlockExists { block_id: id }
            }
            other => other,
        })?;
        debug!(block_id = %id, "created block");
        Ok(WritableBlock { id, file })
    }

    /// Reads the full contents of a block.
    pub fn read_block(&self, id: BlockId) -> StorageResult<Vec<u8>> {
        std::fs::read(self.block_path(id)).map_err(|e| not_found_as_block(e, id))
    }

    /// Deletes a block file.
    pub fn delete_block(&self, id: BlockId) -> StorageResult<()> {
        std::fs::remove_file(self.block_path(id)).map_err(|e| not_found_as_block(e, id))?;
        debug!(block_id = %id, "deleted block");
        Ok(())
    }

    /// Returns true if the block exists on disk.
    pub fn exists(&self, id: BlockId) -> bool {
        self.block_path(id).is_file()
    }

    /// Identifiers of every block currently on disk, sorted.
    pub fn block_ids(&self) -> StorageResult<Vec<BlockId>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(id) = entry.file_name().to_str().and_then(|n| n.parse().ok()) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn block_path(&self, id: BlockId) -> PathBuf {
        self.dir.join(id.file_name())
    }
}

fn not_found_as_block(e: std::io::Error, block_id: BlockId) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::BlockNotFound { block_id }
    } else {
        StorageError::IoError(e)
    }
}

/// A block opened for writing under its newly allocated identifier.
#[derive(Debug)]
pub struct WritableBlock {
    id: BlockId,
    file: DurableFile,
}

impl WritableBlock {
    /// Local identifier of this block.
    pub fn id(&self) -> BlockId {
        self.id
    }
}

impl WritableSink for WritableBlock {
    fn append(&mut self, data: &[u8]) -> StorageResult<()> {
        self.file.append(data)
    }

    fn bytes_appended(&self) -> u64 {
        self.file.written()
    }

    fn close(&mut self) -> StorageResult<()> {
        self.file.close()
    }

    fn abandon(&mut self) -> StorageResult<()> {
        self.file.abandon()
    }

    fn describe(&self) -> String {
        format!("block {}", self.id)
    }
}
