//! On-disk layout of a tablet server's data root.
//!
//! ```text
//! <root>/tablet-meta/<tablet_id>            tablet superblock
//! <root>/consensus-meta/<tablet_id>         consensus metadata
//! <root>/wals/<tablet_id>/<copy_id>/        WAL segments
//! <root>/data/blocks/<block_id>             data blocks
//! <root>/data/storage/<tablet_id>/<copy_id>/ storage-engine files
//! ```
//!
//! WAL and storage-engine directories are scoped by a copy id so that an
//! incoming copy never writes into the directories of the replica it is
//! replacing; the superblock records which directories are live.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::block::BlockId;
use crate::block_manager::FileBlockManager;
use crate::error::StorageResult;
use crate::storage_file::validate_file_name;

const TABLET_META_DIR: &str = "tablet-meta";
const CONSENSUS_META_DIR: &str = "consensus-meta";
const WALS_DIR: &str = "wals";
const BLOCKS_DIR: &str = "data/blocks";
const STORAGE_DIR: &str = "data/storage";

/// Entry point to the local storage of one server.
#[derive(Debug)]
pub struct FsManager {
    root: PathBuf,
    block_manager: FileBlockManager,
}

impl FsManager {
    /// Opens the data root, creating the directory skeleton if needed.
    pub fn open(root: &Path) -> StorageResult<Self> {
        for dir in [TABLET_META_DIR, CONSENSUS_META_DIR, WALS_DIR, STORAGE_DIR] {
            std::fs::create_dir_all(root.join(dir))?;
        }
        let block_manager = FileBlockManager::open(&root.join(BLOCKS_DIR))?;
        info!(root = %root.display(), "opened fs manager");
        Ok(Self {
            root: root.to_path_buf(),
            block_manager,
        })
    }

    /// Data root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Block manager for data blocks.
    pub fn block_manager(&self) -> &FileBlockManager {
        &self.block_manager
    }

    /// Path of the tablet superblock record.
    pub fn tablet_metadata_path(&self, tablet_id: &str) -> StorageResult<PathBuf> {
        validate_file_name(tablet_id)?;
        Ok(self.root.join(TABLET_META_DIR).join(tablet_id))
    }

    /// Path of the consensus metadata record.
    pub fn consensus_metadata_path(&self, tablet_id: &str) -> StorageResult<PathBuf> {
        validate_file_name(tablet_id)?;
        Ok(self.root.join(CONSENSUS_META_DIR).join(tablet_id))
    }

    /// Creates a fresh WAL directory for one copy of `tablet_id`.
    pub fn create_wal_dir(&self, tablet_id: &str, copy_id: &str) -> StorageResult<PathBuf> {
        validate_file_name(tablet_id)?;
        validate_file_name(copy_id)?;
        let dir = self.root.join(WALS_DIR).join(tablet_id).join(copy_id);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Creates a fresh storage-engine directory for one copy of `tablet_id`.
    pub fn create_data_dir(&self, tablet_id: &str, copy_id: &str) -> StorageResult<PathBuf> {
        validate_file_name(tablet_id)?;
        validate_file_name(copy_id)?;
        let dir = self.root.join(STORAGE_DIR).join(tablet_id).join(copy_id);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Removes a directory tree, treating a missing directory as success.
    pub fn remove_dir_if_exists(&self, dir: &Path) -> StorageResult<()> {
        match std::fs::remove_dir_all(dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes blocks that are no longer referenced; failures are logged and
    /// skipped. Returns the number of blocks deleted.
    pub fn delete_orphaned_blocks(&self, blocks: &[BlockId]) -> usize {
        let mut deleted = 0;
        for &block_id in blocks {
            match self.block_manager.delete_block(block_id) {
                Ok(()) => deleted += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(block_id = %block_id, error = %e, "failed to delete orphaned block"),
            }
        }
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{WritableSink, WriteOptions};

    #[test]
    fn test_open_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsManager::open(dir.path()).unwrap();
        for sub in ["tablet-meta", "consensus-meta", "wals", "data/blocks", "data/storage"] {
            assert!(dir.path().join(sub).is_dir(), "{sub} missing");
        }
        assert_eq!(fs.root(), dir.path());
    }

    #[test]
    fn test_paths_reject_bad_tablet_ids() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsManager::open(dir.path()).unwrap();
        assert!(fs.tablet_metadata_path("../escape").is_err());
        assert!(fs.consensus_metadata_path("").is_err());
        assert_eq!(
            fs.tablet_metadata_path("t1").unwrap(),
            dir.path().join("tablet-meta").join("t1")
        );
    }

    #[test]
    fn test_copy_scoped_dirs_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsManager::open(dir.path()).unwrap();
        let a = fs.create_wal_dir("t1", "copy-a").unwrap();
        let b = fs.create_wal_dir("t1", "copy-b").unwrap();
        assert_ne!(a, b);
        assert!(a.is_dir() && b.is_dir());

        fs.remove_dir_if_exists(&a).unwrap();
        fs.remove_dir_if_exists(&a).unwrap();
        assert!(!a.exists());
        assert!(fs.create_data_dir("t1", "copy-a").unwrap().is_dir());
    }

    #[test]
    fn test_delete_orphaned_blocks_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsManager::open(dir.path()).unwrap();
        let mut block = fs.block_manager().create_block(WriteOptions::durable()).unwrap();
        block.close().unwrap();
        let deleted = fs.delete_orphaned_blocks(&[block.id(), BlockId::new(9999)]);
        assert_eq!(deleted, 1);
        assert!(!fs.block_manager().exists(block.id()));
    }
}
