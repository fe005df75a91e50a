//! Local identities for a copied tablet and their installation.
//!
//! A copy never writes into the files of the replica it replaces. Blocks get
//! fresh local ids, WAL segments and storage-engine files go into
//! directories private to the copy, and the new superblock and consensus
//! metadata are both staged durably before either is committed. Only after
//! the commit are the replaced replica's directories and blocks released.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use tabletcopy_consensus::{ConsensusMetadata, ConsensusState, NodeId, Term};
use tabletcopy_storage::{BlockId, FsManager, RowSetMeta, TabletDataState, TabletMetadata, TabletSuperblock};

use crate::error::{CopyError, CopyResult};

/// Remote block id to newly allocated local block id.
#[derive(Debug, Clone, Default)]
pub struct BlockIdentityMap {
    map: BTreeMap<BlockId, BlockId>,
}

impl BlockIdentityMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that remote block `remote` was stored locally as `local`.
    pub fn insert(&mut self, remote: BlockId, local: BlockId) -> CopyResult<()> {
        if let Some(existing) = self.map.get(&remote) {
            return Err(CopyError::DataCorruption(format!(
                "remote block {} listed twice (already stored as {})",
                remote, existing
            )));
        }
        self.map.insert(remote, local);
        Ok(())
    }

    /// Local id of a remote block.
    pub fn get(&self, remote: BlockId) -> Option<BlockId> {
        self.map.get(&remote).copied()
    }

    /// Number of mapped blocks.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when no block has been mapped.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// All local ids, in remote id order.
    pub fn local_ids(&self) -> Vec<BlockId> {
        self.map.values().copied().collect()
    }

    /// Rewrites the row sets of a remote superblock to local ids.
    pub fn remap_rowsets(&self, rowsets: &[RowSetMeta]) -> CopyResult<Vec<RowSetMeta>> {
        rowsets
            .iter()
            .map(|rs| {
                let blocks = rs
                    .blocks
                    .iter()
                    .map(|&remote| {
                        self.get(remote).ok_or_else(|| {
                            CopyError::IllegalState(format!("remote block {} was not downloaded", remote))
                        })
                    })
                    .collect::<CopyResult<Vec<_>>>()?;
                Ok(RowSetMeta { id: rs.id, blocks })
            })
            .collect()
    }
}

/// Existing local replica that the copy replaces.
#[derive(Debug)]
pub struct ReplaceTarget {
    /// Tombstoned metadata of the replica.
    pub metadata: TabletMetadata,
    /// Term of the caller that asked for the copy.
    pub caller_term: Term,
}

/// Checks that `target` may be replaced by a copy of `tablet_id`.
///
/// Returns the replica's consensus metadata if it has any. Nothing on disk
/// is modified.
pub fn validate_replacement(
    fs: &FsManager,
    tablet_id: &str,
    local_uuid: &NodeId,
    target: &ReplaceTarget,
) -> CopyResult<Option<ConsensusMetadata>> {
    if target.metadata.tablet_id() != tablet_id {
        return Err(CopyError::InvalidArgument(format!(
            "tablet to replace is {}, but copy is for tablet {}",
            target.metadata.tablet_id(),
            tablet_id
        )));
    }
    let state = target.metadata.data_state();
    if state != TabletDataState::Tombstoned {
        return Err(CopyError::IllegalState(format!(
            "tablet {} must be {} to be replaced, but is {}",
            tablet_id,
            TabletDataState::Tombstoned,
            state
        )));
    }
    let cmeta = match ConsensusMetadata::load(fs, tablet_id, local_uuid) {
        Ok(cmeta) => cmeta,
        Err(tabletcopy_consensus::ConsensusError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if target.caller_term < cmeta.current_term() {
        return Err(CopyError::InvalidArgument(format!(
            "caller term {} is lower than last logged term {} of tablet {}",
            target.caller_term,
            cmeta.current_term(),
            tablet_id
        )));
    }
    Ok(Some(cmeta))
}

/// Checks that no local records exist for `tablet_id`, as required for a
/// copy that creates a new replica rather than replacing one.
pub fn ensure_no_local_replica(fs: &FsManager, tablet_id: &str) -> CopyResult<()> {
    let has_meta = fs.tablet_metadata_path(tablet_id)?.exists();
    let has_cmeta = ConsensusMetadata::exists(fs, tablet_id)?;
    if has_meta || has_cmeta {
        return Err(CopyError::InvalidArgument(format!(
            "tablet {} already exists locally (metadata: {}, consensus metadata: {}); \
             a tombstoned replica must be set as the tablet to replace",
            tablet_id, has_meta, has_cmeta
        )));
    }
    Ok(())
}

/// Directories and superblock shell for one copy.
#[derive(Debug, Clone)]
pub struct PreparedCopy {
    /// Identifier scoping the copy's directories.
    pub copy_id: String,
    /// Directory receiving WAL segments.
    pub wal_dir: PathBuf,
    /// Directory receiving storage-engine files.
    pub data_dir: PathBuf,
    /// Superblock to fill in as data arrives.
    pub superblock: TabletSuperblock,
    /// WAL segments to fetch, in order.
    pub wal_seqnos: Vec<u64>,
}

/// Creates the copy's private directories and an empty superblock shell
/// describing the remote tablet.
pub fn prepare(
    fs: &FsManager,
    remote: &TabletSuperblock,
    wal_seqnos: &[u64],
) -> CopyResult<PreparedCopy> {
    let copy_id = uuid::Uuid::new_v4().simple().to_string();
    let wal_dir = fs.create_wal_dir(&remote.tablet_id, &copy_id)?;
    let data_dir = fs.create_data_dir(&remote.tablet_id, &copy_id)?;

    let mut superblock = TabletSuperblock::new(&remote.tablet_id, &remote.table_id, &remote.table_name);
    superblock.data_state = TabletDataState::Copying;
    superblock.wal_dir = wal_dir.display().to_string();
    superblock.data_dir = data_dir.display().to_string();

    Ok(PreparedCopy {
        copy_id,
        wal_dir,
        data_dir,
        superblock,
        wal_seqnos: wal_seqnos.to_vec(),
    })
}

/// Removes everything a copy wrote before it was installed.
pub fn discard(fs: &FsManager, prepared: &PreparedCopy, blocks: &BlockIdentityMap) {
    for dir in [&prepared.wal_dir, &prepared.data_dir] {
        if let Err(e) = fs.remove_dir_if_exists(dir) {
            warn!(dir = %dir.display(), error = %e, "failed to remove partial copy directory");
        }
    }
    let deleted = fs.delete_orphaned_blocks(&blocks.local_ids());
    info!(
        tablet_id = %prepared.superblock.tablet_id,
        copy_id = %prepared.copy_id,
        blocks = deleted,
        "discarded partial copy"
    );
}

/// Inputs of [`finalize`].
pub struct FinalizeInput<'a> {
    /// Uuid of the local server.
    pub local_uuid: &'a NodeId,
    /// Fully populated superblock of the copy.
    pub superblock: TabletSuperblock,
    /// Committed consensus state reported by the remote.
    pub remote_cstate: &'a ConsensusState,
    /// Metadata of the replaced replica, if any.
    pub old_metadata: Option<TabletMetadata>,
    /// Consensus metadata of the replaced replica, if any.
    pub old_cmeta: Option<ConsensusMetadata>,
}

/// Installed state of a finished copy.
#[derive(Debug)]
pub struct Installed {
    /// New tablet metadata.
    pub metadata: TabletMetadata,
    /// New consensus metadata.
    pub cmeta: ConsensusMetadata,
}

/// Installs the copy.
///
/// Both records are staged (written and fsynced beside the live ones)
/// before either replaces its predecessor, so a failure up to that point
/// leaves the replaced replica untouched. The old replica's directories and
/// blocks are released last.
pub fn finalize(fs: &FsManager, input: FinalizeInput<'_>) -> CopyResult<Installed> {
    let FinalizeInput {
        local_uuid,
        mut superblock,
        remote_cstate,
        old_metadata,
        old_cmeta,
    } = input;
    let tablet_id = superblock.tablet_id.clone();

    let cmeta = match old_cmeta {
        Some(mut cmeta) => {
            cmeta.merge_committed_state(remote_cstate);
            cmeta
        }
        None => ConsensusMetadata::new_unflushed(
            fs,
            &tablet_id,
            local_uuid.clone(),
            remote_cstate.config.clone(),
            remote_cstate.current_term,
        )?,
    };

    superblock.data_state = TabletDataState::Ready;
    superblock.tombstone_last_logged_index = None;
    superblock.update_checksum()?;

    let old_superblock = old_metadata.as_ref().map(|m| m.superblock().clone());
    let mut metadata = match old_metadata {
        Some(metadata) => metadata,
        None => TabletMetadata::new_unpersisted(fs, superblock.clone())?,
    };

    let staged_cmeta = cmeta.stage()?;
    let staged_superblock = metadata.stage_superblock(&superblock)?;
    cmeta.commit(staged_cmeta)?;
    metadata.commit_staged(staged_superblock, superblock)?;
    info!(tablet_id = %tablet_id, term = %cmeta.current_term(), "installed copied tablet");

    if let Some(old) = old_superblock {
        release_replaced(fs, &old, metadata.superblock());
    }
    Ok(Installed { metadata, cmeta })
}

/// Deletes what the replaced superblock referenced and the new one does not.
fn release_replaced(fs: &FsManager, old: &TabletSuperblock, new: &TabletSuperblock) {
    for (old_dir, new_dir) in [(&old.wal_dir, &new.wal_dir), (&old.data_dir, &new.data_dir)] {
        if old_dir.is_empty() || old_dir == new_dir {
            continue;
        }
        if let Err(e) = fs.remove_dir_if_exists(Path::new(old_dir)) {
            warn!(dir = %old_dir, error = %e, "failed to remove replaced directory");
        }
    }
    let live: HashSet<BlockId> = new.block_ids().into_iter().collect();
    let orphaned: Vec<BlockId> = old
        .block_ids()
        .into_iter()
        .filter(|id| !live.contains(id))
        .collect();
    let deleted = fs.delete_orphaned_blocks(&orphaned);
    info!(tablet_id = %new.tablet_id, blocks = deleted, "released blocks of replaced replica");
}
