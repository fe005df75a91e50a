//! Durable tablet metadata: the persisted superblock of one tablet.

use std::path::PathBuf;

use tracing::info;

use crate::atomic_write::StagedFile;
use crate::error::{StorageError, StorageResult};
use crate::fs_manager::FsManager;
use crate::superblock::{TabletDataState, TabletSuperblock};

/// Handle on a tablet's metadata record.
///
/// The superblock is never edited in place on disk: every change is written
/// as a complete new superblock and renamed over the previous one.
#[derive(Debug, Clone)]
pub struct TabletMetadata {
    path: PathBuf,
    superblock: TabletSuperblock,
    persisted: bool,
}

impl TabletMetadata {
    /// Loads the metadata of `tablet_id`.
    pub fn load(fs: &FsManager, tablet_id: &str) -> StorageResult<Self> {
        let path = fs.tablet_metadata_path(tablet_id)?;
        let bytes = std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound { path: path.clone() }
            } else {
                StorageError::IoError(e)
            }
        })?;
        let superblock = TabletSuperblock::from_bytes(&bytes)?;
        if superblock.tablet_id != tablet_id {
            return Err(StorageError::CorruptedSuperblock {
                reason: format!(
                    "record for tablet {} holds superblock of tablet {}",
                    tablet_id, superblock.tablet_id
                ),
            });
        }
        Ok(Self {
            path,
            superblock,
            persisted: true,
        })
    }

    /// Wraps a superblock that has not been written to disk yet.
    pub fn new_unpersisted(fs: &FsManager, superblock: TabletSuperblock) -> StorageResult<Self> {
        let path = fs.tablet_metadata_path(&superblock.tablet_id)?;
        Ok(Self {
            path,
            superblock,
            persisted: false,
        })
    }

    /// Tablet identifier.
    pub fn tablet_id(&self) -> &str {
        &self.superblock.tablet_id
    }

    /// Current superblock.
    pub fn superblock(&self) -> &TabletSuperblock {
        &self.superblock
    }

    /// Current data state.
    pub fn data_state(&self) -> TabletDataState {
        self.superblock.data_state
    }

    /// Whether a superblock for this tablet exists on disk.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Writes `superblock` durably beside the live record without replacing it.
    pub fn stage_superblock(&self, superblock: &TabletSuperblock) -> StorageResult<StagedFile> {
        if superblock.tablet_id != self.superblock.tablet_id {
            return Err(StorageError::CorruptedSuperblock {
                reason: format!(
                    "cannot replace superblock of tablet {} with one for tablet {}",
                    self.superblock.tablet_id, superblock.tablet_id
                ),
            });
        }
        StagedFile::stage(&self.path, &superblock.to_bytes()?)
    }

    /// Makes a staged superblock live and adopts it in memory.
    pub fn commit_staged(&mut self, staged: StagedFile, superblock: TabletSuperblock) -> StorageResult<()> {
        staged.commit()?;
        info!(
            tablet_id = %superblock.tablet_id,
            state = %superblock.data_state,
            blocks = superblock.num_blocks(),
            "replaced tablet superblock"
        );
        self.superblock = superblock;
        self.persisted = true;
        Ok(())
    }

    /// Atomically replaces the persisted superblock.
    pub fn replace_superblock(&mut self, superblock: TabletSuperblock) -> StorageResult<()> {
        let staged = self.stage_superblock(&superblock)?;
        self.commit_staged(staged, superblock)
    }

    /// Marks the tablet tombstoned. Block references are kept so that they
    /// can be released once a replacement copy has been installed.
    pub fn tombstone(&mut self, last_logged_index: Option<u64>) -> StorageResult<()> {
        let mut superblock = self.superblock.clone();
        superblock.data_state = TabletDataState::Tombstoned;
        superblock.tombstone_last_logged_index = last_logged_index;
        self.replace_superblock(superblock)
    }
}
