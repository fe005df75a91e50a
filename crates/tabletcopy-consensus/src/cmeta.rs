//! Durable consensus metadata of a tablet replica.
//!
//! The record holds the replica's current term, its vote in that term and the
//! last committed Raft configuration. It is serialized with bincode and
//! followed by a little-endian CRC32 of the payload; it is only ever replaced
//! as a whole through a staged write.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tabletcopy_storage::checksum::crc32;
use tabletcopy_storage::{write_atomic, FsManager, StagedFile, StorageError};

use crate::raft_config::{ConsensusState, RaftConfig};
use crate::types::*;

const CRC_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CmetaRecord {
    tablet_id: String,
    peer_uuid: NodeId,
    current_term: Term,
    voted_for: Option<NodeId>,
    committed_config: RaftConfig,
}

/// Consensus metadata of one replica.
#[derive(Debug, Clone)]
pub struct ConsensusMetadata {
    path: PathBuf,
    record: CmetaRecord,
    pending_config: Option<RaftConfig>,
    leader_uuid: Option<NodeId>,
}

impl ConsensusMetadata {
    /// Creates and flushes a new record. Fails if one already exists.
    pub fn create(
        fs: &FsManager,
        tablet_id: &str,
        peer_uuid: NodeId,
        config: RaftConfig,
        current_term: Term,
    ) -> ConsensusResult<Self> {
        let cmeta = Self::new_unflushed(fs, tablet_id, peer_uuid, config, current_term)?;
        if cmeta.path.exists() {
            return Err(ConsensusError::IllegalState(format!(
                "consensus metadata for tablet {} already exists",
                tablet_id
            )));
        }
        cmeta.flush()?;
        Ok(cmeta)
    }

    /// Builds a record in memory without writing it.
    pub fn new_unflushed(
        fs: &FsManager,
        tablet_id: &str,
        peer_uuid: NodeId,
        config: RaftConfig,
        current_term: Term,
    ) -> ConsensusResult<Self> {
        let path = fs.consensus_metadata_path(tablet_id)?;
        Ok(Self {
            path,
            record: CmetaRecord {
                tablet_id: tablet_id.to_string(),
                peer_uuid,
                current_term,
                voted_for: None,
                committed_config: config,
            },
            pending_config: None,
            leader_uuid: None,
        })
    }

    /// Loads the record of `tablet_id`.
    pub fn load(fs: &FsManager, tablet_id: &str, peer_uuid: &NodeId) -> ConsensusResult<Self> {
        let path = fs.consensus_metadata_path(tablet_id)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConsensusError::NotFound(format!(
                    "consensus metadata for tablet {}",
                    tablet_id
                )))
            }
            Err(e) => return Err(StorageError::IoError(e).into()),
        };
        let record = decode(&bytes)?;
        if record.tablet_id != tablet_id {
            return Err(ConsensusError::Corruption(format!(
                "record for tablet {} belongs to tablet {}",
                tablet_id, record.tablet_id
            )));
        }
        if &record.peer_uuid != peer_uuid {
            return Err(ConsensusError::Corruption(format!(
                "record for tablet {} was written by peer {}, expected {}",
                tablet_id, record.peer_uuid, peer_uuid
            )));
        }
        debug!(tablet_id, term = %record.current_term, "loaded consensus metadata");
        Ok(Self {
            path,
            record,
            pending_config: None,
            leader_uuid: None,
        })
    }

    /// Returns true if a record exists for `tablet_id`.
    pub fn exists(fs: &FsManager, tablet_id: &str) -> ConsensusResult<bool> {
        Ok(fs.consensus_metadata_path(tablet_id)?.exists())
    }

    /// Tablet this record belongs to.
    pub fn tablet_id(&self) -> &str {
        &self.record.tablet_id
    }

    /// Uuid of the local peer.
    pub fn peer_uuid(&self) -> &NodeId {
        &self.record.peer_uuid
    }

    /// Current term.
    pub fn current_term(&self) -> Term {
        self.record.current_term
    }

    /// Candidate voted for in the current term.
    pub fn voted_for(&self) -> Option<&NodeId> {
        self.record.voted_for.as_ref()
    }

    /// Last committed configuration.
    pub fn committed_config(&self) -> &RaftConfig {
        &self.record.committed_config
    }

    /// Pending configuration, if a change is in flight. Never persisted.
    pub fn pending_config(&self) -> Option<&RaftConfig> {
        self.pending_config.as_ref()
    }

    /// Configuration in effect: the pending one if present, else the committed one.
    pub fn active_config(&self) -> &RaftConfig {
        self.pending_config
            .as_ref()
            .unwrap_or(&self.record.committed_config)
    }

    /// Sets the current term. A new term clears the vote.
    pub fn set_current_term(&mut self, term: Term) {
        if term != self.record.current_term {
            self.record.voted_for = None;
        }
        self.record.current_term = term;
    }

    /// Records a vote in the current term.
    pub fn set_voted_for(&mut self, uuid: NodeId) {
        self.record.voted_for = Some(uuid);
    }

    /// Replaces the committed configuration.
    pub fn set_committed_config(&mut self, config: RaftConfig) {
        self.record.committed_config = config;
    }

    /// Marks a configuration change as in flight.
    pub fn set_pending_config(&mut self, config: RaftConfig) {
        self.pending_config = Some(config);
    }

    /// Drops the in-flight configuration change.
    pub fn clear_pending_config(&mut self) {
        self.pending_config = None;
    }

    /// Records the leader known for the current term.
    pub fn set_leader_uuid(&mut self, leader: Option<NodeId>) {
        self.leader_uuid = leader;
    }

    /// Adopts the committed state reported by another replica.
    ///
    /// A higher term replaces ours and clears the vote; the committed
    /// configuration is always taken over and any pending change dropped.
    pub fn merge_committed_state(&mut self, state: &ConsensusState) {
        if state.current_term > self.record.current_term {
            self.record.current_term = state.current_term;
            self.record.voted_for = None;
        }
        self.record.committed_config = state.config.clone();
        self.pending_config = None;
        self.leader_uuid = None;
    }

    /// Writes the record atomically.
    pub fn flush(&self) -> ConsensusResult<()> {
        write_atomic(&self.path, &encode(&self.record)?)?;
        info!(
            tablet_id = %self.record.tablet_id,
            term = %self.record.current_term,
            "flushed consensus metadata"
        );
        Ok(())
    }

    /// Writes the record beside the live one without replacing it.
    pub fn stage(&self) -> ConsensusResult<StagedFile> {
        Ok(StagedFile::stage(&self.path, &encode(&self.record)?)?)
    }

    /// Makes a record previously returned by [`stage`](Self::stage) live.
    pub fn commit(&self, staged: StagedFile) -> ConsensusResult<()> {
        staged.commit()?;
        info!(
            tablet_id = %self.record.tablet_id,
            term = %self.record.current_term,
            "committed consensus metadata"
        );
        Ok(())
    }

    /// Snapshot of term, leader and configuration.
    pub fn to_consensus_state(&self, config: RaftConfig) -> ConsensusState {
        ConsensusState {
            current_term: self.record.current_term,
            leader_uuid: self.leader_uuid.clone(),
            config,
        }
    }
}

fn encode(record: &CmetaRecord) -> ConsensusResult<Vec<u8>> {
    let mut bytes =
        bincode::serialize(record).map_err(|e| ConsensusError::Corruption(e.to_string()))?;
    let crc = crc32(&bytes);
    bytes.extend_from_slice(&crc.to_le_bytes());
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> ConsensusResult<CmetaRecord> {
    if bytes.len() < CRC_LEN {
        return Err(ConsensusError::Corruption(format!(
            "record too short: {} bytes",
            bytes.len()
        )));
    }
    let (payload, trailer) = bytes.split_at(bytes.len() - CRC_LEN);
    let mut crc_bytes = [0u8; CRC_LEN];
    crc_bytes.copy_from_slice(trailer);
    let expected = u32::from_le_bytes(crc_bytes);
    let actual = crc32(payload);
    if expected != actual {
        return Err(ConsensusError::Corruption(format!(
            "checksum mismatch: expected {:#010x}, got {:#010x}",
            expected, actual
        )));
    }
    bincode::deserialize(payload).map_err(|e| ConsensusError::Corruption(e.to_string()))
}
