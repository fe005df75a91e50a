//! Raft configuration and consensus state as reported by replicas.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::*;

/// Role of a peer within a Raft configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberType {
    /// Votes and counts towards the majority.
    Voter,
    /// Being brought up to date before promotion to voter.
    PreVoter,
    /// Receives the log but never votes.
    Observer,
    /// Being brought up to date before promotion to observer.
    PreObserver,
}

impl MemberType {
    /// True for members admitted provisionally while they catch up.
    pub fn is_pre_member(&self) -> bool {
        matches!(self, MemberType::PreVoter | MemberType::PreObserver)
    }
}

/// Host and port of a server's RPC endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostPort {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl HostPort {
    /// Creates a new host/port pair.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host:port`.
    pub fn parse(s: &str) -> ConsensusResult<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ConsensusError::InvalidArgument(format!("missing port in {:?}", s)))?;
        if host.is_empty() {
            return Err(ConsensusError::InvalidArgument(format!("missing host in {:?}", s)));
        }
        let port = port
            .parse()
            .map_err(|_| ConsensusError::InvalidArgument(format!("invalid port in {:?}", s)))?;
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A member of a Raft configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftPeer {
    /// Permanent uuid of the peer.
    pub permanent_uuid: NodeId,
    /// Role of the peer.
    pub member_type: MemberType,
    /// Last address the peer was known to listen on.
    pub last_known_addr: Option<HostPort>,
}

impl RaftPeer {
    /// Creates a peer entry.
    pub fn new(uuid: impl Into<String>, member_type: MemberType, addr: Option<HostPort>) -> Self {
        Self {
            permanent_uuid: NodeId::new(uuid),
            member_type,
            last_known_addr: addr,
        }
    }
}

/// Membership of a Raft group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftConfig {
    /// Index of the log entry that committed this configuration, if any.
    pub opid_index: Option<u64>,
    /// Members of the group.
    pub peers: Vec<RaftPeer>,
}

impl RaftConfig {
    /// Looks up a peer by uuid.
    pub fn peer(&self, uuid: &NodeId) -> Option<&RaftPeer> {
        self.peers.iter().find(|p| &p.permanent_uuid == uuid)
    }

    /// True if `uuid` is a full voter.
    pub fn is_voter(&self, uuid: &NodeId) -> bool {
        self.peer(uuid)
            .map(|p| p.member_type == MemberType::Voter)
            .unwrap_or(false)
    }

    /// Number of full voters.
    pub fn num_voters(&self) -> usize {
        self.peers
            .iter()
            .filter(|p| p.member_type == MemberType::Voter)
            .count()
    }
}

/// Term, leader and configuration of a replica.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusState {
    /// Current term.
    pub current_term: Term,
    /// Leader known for the current term, if any.
    pub leader_uuid: Option<NodeId>,
    /// Configuration (committed or active depending on the query).
    pub config: RaftConfig,
}
