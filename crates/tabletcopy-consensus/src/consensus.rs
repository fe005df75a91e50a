//! Read-only view of a replica's consensus state.

use tracing::debug;

use crate::cmeta::ConsensusMetadata;
use crate::raft_config::{ConsensusState, MemberType};
use crate::types::*;

/// Which configuration a consensus query refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConsensusConfigType {
    /// The last configuration committed to the log.
    Committed,
    /// The configuration in effect, including an uncommitted change.
    Active,
}

/// Consensus state of a local replica as seen by other subsystems.
pub trait Consensus: Send + Sync {
    /// Uuid of the local peer.
    fn peer_uuid(&self) -> &NodeId;

    /// Tablet the replica belongs to.
    fn tablet_id(&self) -> &str;

    /// Term, leader and the requested configuration.
    fn consensus_state(&self, config_type: ConsensusConfigType) -> ConsensusState;
}

impl Consensus for ConsensusMetadata {
    fn peer_uuid(&self) -> &NodeId {
        ConsensusMetadata::peer_uuid(self)
    }

    fn tablet_id(&self) -> &str {
        ConsensusMetadata::tablet_id(self)
    }

    fn consensus_state(&self, config_type: ConsensusConfigType) -> ConsensusState {
        let config = match config_type {
            ConsensusConfigType::Committed => self.committed_config().clone(),
            ConsensusConfigType::Active => self.active_config().clone(),
        };
        self.to_consensus_state(config)
    }
}

/// Checks that the committed configuration admits the local peer as a full
/// member.
///
/// A peer still listed as `PreVoter` or `PreObserver` has been copied but the
/// configuration change promoting it is not committed yet.
pub fn verify_peer_admitted(consensus: &dyn Consensus) -> ConsensusResult<()> {
    let uuid = consensus.peer_uuid();
    let state = consensus.consensus_state(ConsensusConfigType::Committed);
    let peer = state.config.peer(uuid).ok_or_else(|| {
        ConsensusError::NotFound(format!(
            "peer {} in committed config of tablet {}",
            uuid,
            consensus.tablet_id()
        ))
    })?;
    match peer.member_type {
        MemberType::Voter | MemberType::Observer => {
            debug!(tablet_id = consensus.tablet_id(), peer = %uuid, member_type = ?peer.member_type, "peer admitted");
            Ok(())
        }
        MemberType::PreVoter | MemberType::PreObserver => Err(ConsensusError::IllegalState(format!(
            "change config not yet committed: peer {} is still {:?}",
            uuid, peer.member_type
        ))),
    }
}
