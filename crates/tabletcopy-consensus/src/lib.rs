#![warn(missing_docs)]

//! tabletcopy consensus subsystem: Raft identifiers and configuration, consensus metadata, peer tracking
//!
//! Only the parts of consensus that tablet copy relies on live here: the
//! durable per-replica term and configuration record, a read-only view used to
//! confirm that a copied replica has been admitted to its Raft group, and the
//! tracker of remote peers that receive replication signals.

pub mod cmeta;
pub mod consensus;
pub mod peer_manager;
pub mod raft_config;
pub mod types;

pub use cmeta::ConsensusMetadata;
pub use consensus::{verify_peer_admitted, Consensus, ConsensusConfigType};
pub use peer_manager::{Peer, PeerFactory, PeerManager};
pub use raft_config::{ConsensusState, HostPort, MemberType, RaftConfig, RaftPeer};
pub use types::{ConsensusError, ConsensusResult, LogIndex, NodeId, OpId, Term};
