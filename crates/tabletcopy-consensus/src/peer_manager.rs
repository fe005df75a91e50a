//! Tracks the remote peers of a tablet's Raft group and routes replication
//! signals to them.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::raft_config::{RaftConfig, RaftPeer};
use crate::types::*;

/// A remote member of the Raft group that can be signalled.
pub trait Peer: Send {
    /// Asks the peer to send pending requests. An error means the peer is closed.
    fn signal_request(&mut self, force_if_queue_empty: bool) -> ConsensusResult<()>;

    /// Closes the peer; it must not be signalled afterwards.
    fn close(&mut self);

    /// Configuration entry this peer was created from.
    fn raft_peer(&self) -> &RaftPeer;
}

/// Creates [`Peer`]s for newly configured members.
pub trait PeerFactory: Send + Sync {
    /// Builds a peer talking to `peer` on behalf of `local_uuid`.
    fn new_remote_peer(
        &self,
        peer: &RaftPeer,
        tablet_id: &str,
        local_uuid: &NodeId,
    ) -> ConsensusResult<Box<dyn Peer>>;
}

/// Set of remote peers of one replica, keyed by permanent uuid.
pub struct PeerManager {
    tablet_id: String,
    local_uuid: NodeId,
    factory: Box<dyn PeerFactory>,
    peers: Mutex<HashMap<NodeId, Box<dyn Peer>>>,
}

impl PeerManager {
    /// Creates an empty peer manager.
    pub fn new(tablet_id: impl Into<String>, local_uuid: NodeId, factory: Box<dyn PeerFactory>) -> Self {
        Self {
            tablet_id: tablet_id.into(),
            local_uuid,
            factory,
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Creates peers for members of `config` not tracked yet. The local
    /// peer is skipped. Existing peers are kept even if absent from `config`.
    pub fn update_raft_config(&self, config: &RaftConfig) -> ConsensusResult<()> {
        debug!(prefix = %self.log_prefix(), peers = config.peers.len(), "updating peers from new config");
        let mut peers = self.peers.lock();
        for raft_peer in &config.peers {
            let uuid = &raft_peer.permanent_uuid;
            if peers.contains_key(uuid) || uuid == &self.local_uuid {
                continue;
            }
            debug!(prefix = %self.log_prefix(), peer = %uuid, "adding remote peer");
            let peer = self
                .factory
                .new_remote_peer(raft_peer, &self.tablet_id, &self.local_uuid)
                .map_err(|e| {
                    ConsensusError::PeerError(format!(
                        "could not obtain a remote proxy to peer {}: {}",
                        uuid, e
                    ))
                })?;
            peers.insert(uuid.clone(), peer);
        }
        Ok(())
    }

    /// Signals every peer; peers that fail are considered closed and removed.
    pub fn signal_request(&self, force_if_queue_empty: bool) {
        let mut peers = self.peers.lock();
        peers.retain(|uuid, peer| match peer.signal_request(force_if_queue_empty) {
            Ok(()) => true,
            Err(e) => {
                warn!(prefix = %self.log_prefix(), peer = %uuid, error = %e, "peer was closed, removing from peers");
                false
            }
        });
    }

    /// Closes and forgets every peer.
    pub fn close(&self) {
        let mut peers = self.peers.lock();
        for peer in peers.values_mut() {
            peer.close();
        }
        peers.clear();
    }

    /// Number of tracked peers.
    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    /// True if `uuid` is tracked.
    pub fn contains(&self, uuid: &NodeId) -> bool {
        self.peers.lock().contains_key(uuid)
    }

    /// Prefix for log lines about this replica.
    pub fn log_prefix(&self) -> String {
        format!("T {} P {}: ", self.tablet_id, self.local_uuid)
    }
}

impl Drop for PeerManager {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft_config::MemberType;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[derive(Default)]
    struct Journal {
        created: Vec<NodeId>,
        closed: Vec<NodeId>,
        signals: Vec<NodeId>,
    }

    struct FakePeer {
        raft_peer: RaftPeer,
        journal: Arc<parking_lot::Mutex<Journal>>,
        fail_signal: bool,
    }

    impl Peer for FakePeer {
        fn signal_request(&mut self, _force: bool) -> ConsensusResult<()> {
            self.journal.lock().signals.push(self.raft_peer.permanent_uuid.clone());
            if self.fail_signal {
                return Err(ConsensusError::PeerError("closed".to_string()));
            }
            Ok(())
        }

        fn close(&mut self) {
            self.journal.lock().closed.push(self.raft_peer.permanent_uuid.clone());
        }

        fn raft_peer(&self) -> &RaftPeer {
            &self.raft_peer
        }
    }

    struct FakeFactory {
        journal: Arc<parking_lot::Mutex<Journal>>,
        failing: HashSet<NodeId>,
        unreachable: HashSet<NodeId>,
    }

    impl PeerFactory for FakeFactory {
        fn new_remote_peer(
            &self,
            peer: &RaftPeer,
            _tablet_id: &str,
            _local_uuid: &NodeId,
        ) -> ConsensusResult<Box<dyn Peer>> {
            if self.unreachable.contains(&peer.permanent_uuid) {
                return Err(ConsensusError::PeerError("unreachable".to_string()));
            }
            self.journal.lock().created.push(peer.permanent_uuid.clone());
            Ok(Box::new(FakePeer {
                raft_peer: peer.clone(),
                journal: self.journal.clone(),
                fail_signal: self.failing.contains(&peer.permanent_uuid),
            }))
        }
    }

    fn manager(
        failing: &[&str],
        unreachable: &[&str],
    ) -> (PeerManager, Arc<parking_lot::Mutex<Journal>>) {
        let journal = Arc::new(parking_lot::Mutex::new(Journal::default()));
        let factory = FakeFactory {
            journal: journal.clone(),
            failing: failing.iter().map(|s| NodeId::new(*s)).collect(),
            unreachable: unreachable.iter().map(|s| NodeId::new(*s)).collect(),
        };
        (PeerManager::new("t1", NodeId::new("self"), Box::new(factory)), journal)
    }

    fn config(uuids: &[&str]) -> RaftConfig {
        RaftConfig {
            opid_index: Some(1),
            peers: uuids
                .iter()
                .map(|u| RaftPeer::new(*u, MemberType::Voter, None))
                .collect(),
        }
    }

    #[test]
    fn test_update_skips_self_and_existing() {
        let (pm, journal) = manager(&[], &[]);
        pm.update_raft_config(&config(&["self", "a", "b"])).unwrap();
        assert_eq!(pm.peer_count(), 2);
        assert!(!pm.contains(&NodeId::new("self")));

        pm.update_raft_config(&config(&["self", "a", "b", "c"])).unwrap();
        assert_eq!(pm.peer_count(), 3);
        assert_eq!(journal.lock().created.len(), 3);
    }

    #[test]
    fn test_update_keeps_peers_missing_from_new_config() {
        let (pm, _journal) = manager(&[], &[]);
        pm.update_raft_config(&config(&["a", "b"])).unwrap();
        pm.update_raft_config(&config(&["a"])).unwrap();
        assert!(pm.contains(&NodeId::new("b")));
    }

    #[test]
    fn test_update_propagates_factory_error() {
        let (pm, _journal) = manager(&[], &["b"]);
        let err = pm.update_raft_config(&config(&["a", "b"])).unwrap_err();
        assert!(matches!(err, ConsensusError::PeerError(_)));
    }

    #[test]
    fn test_signal_removes_failed_peers() {
        let (pm, journal) = manager(&["b"], &[]);
        pm.update_raft_config(&config(&["a", "b", "c"])).unwrap();
        pm.signal_request(false);
        assert_eq!(journal.lock().signals.len(), 3);
        assert_eq!(pm.peer_count(), 2);
        assert!(!pm.contains(&NodeId::new("b")));

        pm.signal_request(true);
        assert_eq!(journal.lock().signals.len(), 5);
    }

    #[test]
    fn test_close_and_drop_close_every_peer() {
        let (pm, journal) = manager(&[], &[]);
        pm.update_raft_config(&config(&["a", "b"])).unwrap();
        pm.close();
        assert_eq!(pm.peer_count(), 0);
        assert_eq!(journal.lock().closed.len(), 2);

        pm.update_raft_config(&config(&["c"])).unwrap();
        drop(pm);
        assert_eq!(journal.lock().closed.len(), 3);
    }

    #[test]
    fn test_log_prefix() {
        let (pm, _journal) = manager(&[], &[]);
        assert_eq!(pm.log_prefix(), "T t1 P self: ");
    }
}
