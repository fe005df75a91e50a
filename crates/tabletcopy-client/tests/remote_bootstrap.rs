mod common;

use std::collections::HashSet;
use std::path::Path;

use common::*;
use tabletcopy_client::{DataId, ErrorKind, RemoteBootstrapErrorCode, SessionState, STATUS_PREFIX};
use tabletcopy_consensus::{ConsensusMetadata, MemberType, NodeId, Term};
use tabletcopy_storage::wal::segment_file_name;
use tabletcopy_storage::{BlockId, TabletDataState, TabletMetadata, TabletSuperblock};

fn read_record(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap()
}

#[tokio::test]
async fn test_fresh_copy_installs_tablet() {
    let h = Harness::new(ScriptedPeer::new(&[3, 4], 5));
    let mut client = h.client();
    let (uuid, addr) = h.source();
    client.run(&uuid, &addr).await.unwrap();

    assert_eq!(client.state(), SessionState::Ended);
    let progress = client.progress().clone();
    assert!(progress.session_started && progress.succeeded);
    assert_eq!(progress.wal_segments_downloaded, 2);
    assert_eq!(progress.blocks_downloaded, 5);
    assert_eq!(progress.storage_files_downloaded, 1);
    assert_eq!(h.peer.end_calls(), vec![true]);

    let meta = TabletMetadata::load(&h.fs, TABLET).unwrap();
    let sb = meta.superblock();
    assert_eq!(sb.data_state, TabletDataState::Ready);
    assert_eq!(sb.table_name, "orders");
    assert_eq!(sb.num_blocks(), 5);
    for (rs_local, rs_remote) in sb.rowsets.iter().zip(&h.peer.superblock.rowsets) {
        assert_eq!(rs_local.id, rs_remote.id);
        for (local, remote) in rs_local.blocks.iter().zip(&rs_remote.blocks) {
            assert_eq!(h.fs.block_manager().read_block(*local).unwrap(), h.peer.blocks[remote]);
        }
    }
    for (seqno, bytes) in &h.peer.wal {
        let path = Path::new(&sb.wal_dir).join(segment_file_name(*seqno));
        assert_eq!(&std::fs::read(path).unwrap(), bytes);
    }
    let sst = std::fs::read(Path::new(&sb.data_dir).join("000011.sst")).unwrap();
    assert_eq!(sst, h.peer.files["000011.sst"]);

    let cmeta = ConsensusMetadata::load(&h.fs, TABLET, &NodeId::new(LOCAL)).unwrap();
    assert_eq!(cmeta.current_term(), Term::new(6));
    assert_eq!(cmeta.committed_config(), &h.peer.cstate.config);

    let messages = h.status.messages();
    assert!(messages.iter().all(|m| m.starts_with(STATUS_PREFIX)));
    assert!(messages.iter().any(|m| m.contains("Downloading WAL segment 3 (1/2)")));
    assert_eq!(h.status.last().unwrap(), "RemoteBootstrap: Remote bootstrap complete");
}

#[tokio::test]
async fn test_block_map_has_one_distinct_local_id_per_remote_block() {
    let h = Harness::new(ScriptedPeer::new(&[1], 7));
    let mut client = h.client();
    let (uuid, addr) = h.source();
    client.start(&uuid, &addr).await.unwrap();
    client.fetch_all().await.unwrap();
    assert_eq!(client.state(), SessionState::DataFetched);

    let map = client.block_map();
    assert_eq!(map.len(), 7);
    let locals: HashSet<BlockId> = map.local_ids().into_iter().collect();
    assert_eq!(locals.len(), 7);
    for remote in h.peer.superblock.block_ids() {
        let local = map.get(remote).unwrap();
        assert_ne!(local, remote);
    }
    client.finish().await.unwrap();
    client.end_session().await;
}

#[tokio::test]
async fn test_end_session_is_sent_exactly_once() {
    let h = Harness::new(ScriptedPeer::new(&[1], 1));
    let mut client = h.client();
    let (uuid, addr) = h.source();
    client.run(&uuid, &addr).await.unwrap();
    client.end_session().await;
    client.abort().await;
    client.end_session().await;
    drop(client);
    tokio::task::yield_now().await;
    assert_eq!(h.peer.end_calls(), vec![true]);
}

#[tokio::test]
async fn test_repeated_phase_is_already_in_progress() {
    let h = Harness::new(ScriptedPeer::new(&[1], 1));
    let mut client = h.client();
    let (uuid, addr) = h.source();
    client.start(&uuid, &addr).await.unwrap();
    let err = client.start(&uuid, &addr).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyInProgress);
    assert_eq!(client.state(), SessionState::Started);
    let err = client.download_data().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert_eq!(client.state(), SessionState::Started);
    client.abort().await;
    assert_eq!(h.peer.end_calls(), vec![false]);
}

#[tokio::test]
async fn test_stale_caller_term_touches_nothing() {
    let h = Harness::new(ScriptedPeer::new(&[1], 2));
    let (meta, old_block) = tombstoned_replica(&h.fs, 8);
    let meta_path = h.fs.tablet_metadata_path(TABLET).unwrap();
    let cmeta_path = h.fs.consensus_metadata_path(TABLET).unwrap();
    let meta_before = read_record(&meta_path);
    let cmeta_before = read_record(&cmeta_path);

    let mut client = h.client();
    client.set_tablet_to_replace(meta, Term::new(7)).unwrap();
    let (uuid, addr) = h.source();
    let err = client.run(&uuid, &addr).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(client.state(), SessionState::Ended);

    assert!(h.peer.calls().is_empty());
    assert_eq!(read_record(&meta_path), meta_before);
    assert_eq!(read_record(&cmeta_path), cmeta_before);
    assert!(h.fs.block_manager().exists(old_block));
}

#[tokio::test]
async fn test_replacing_tombstoned_replica() {
    let h = Harness::new(ScriptedPeer::new(&[2, 3], 3));
    let (meta, old_block) = tombstoned_replica(&h.fs, 4);
    let old_wal_dir = meta.superblock().wal_dir.clone();
    let old_data_dir = meta.superblock().data_dir.clone();

    let mut client = h.client();
    client.set_tablet_to_replace(meta, Term::new(5)).unwrap();
    let (uuid, addr) = h.source();
    client.run(&uuid, &addr).await.unwrap();

    let meta = TabletMetadata::load(&h.fs, TABLET).unwrap();
    assert_eq!(meta.data_state(), TabletDataState::Ready);
    assert_eq!(meta.superblock().tombstone_last_logged_index, None);
    assert_ne!(meta.superblock().wal_dir, old_wal_dir);
    assert!(!meta.superblock().block_ids().contains(&old_block));

    assert!(!h.fs.block_manager().exists(old_block));
    assert!(!Path::new(&old_wal_dir).exists());
    assert!(!Path::new(&old_data_dir).exists());

    let cmeta = ConsensusMetadata::load(&h.fs, TABLET, &NodeId::new(LOCAL)).unwrap();
    assert_eq!(cmeta.current_term(), Term::new(6));
    assert_eq!(cmeta.committed_config().opid_index, Some(40));
    assert_eq!(h.peer.end_calls(), vec![true]);
}

#[tokio::test]
async fn test_equal_caller_term_is_accepted() {
    let h = Harness::new(ScriptedPeer::new(&[1], 1));
    let (meta, _) = tombstoned_replica(&h.fs, 6);
    let mut client = h.client();
    client.set_tablet_to_replace(meta, Term::new(6)).unwrap();
    let (uuid, addr) = h.source();
    client.run(&uuid, &addr).await.unwrap();
    assert!(client.progress().succeeded);
}

#[tokio::test]
async fn test_fresh_replica_skips_term_validation() {
    let h = Harness::new(ScriptedPeer::new(&[1], 1));
    let mut client = h.client();
    let (uuid, addr) = h.source();
    client.run(&uuid, &addr).await.unwrap();
    assert_eq!(h.peer.calls()[0], Call::Begin);
    assert!(client.metadata().is_some());
}

#[tokio::test]
async fn test_new_replica_over_existing_records_is_rejected() {
    let h = Harness::new(ScriptedPeer::new(&[1], 2));
    let (_meta, old_block) = tombstoned_replica(&h.fs, 9);
    let meta_path = h.fs.tablet_metadata_path(TABLET).unwrap();
    let cmeta_path = h.fs.consensus_metadata_path(TABLET).unwrap();
    let meta_before = read_record(&meta_path);
    let cmeta_before = read_record(&cmeta_path);

    let mut client = h.client();
    let (uuid, addr) = h.source();
    let err = client.run(&uuid, &addr).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(client.state(), SessionState::Ended);

    assert!(h.peer.calls().is_empty());
    assert_eq!(read_record(&meta_path), meta_before);
    assert_eq!(read_record(&cmeta_path), cmeta_before);
    let cmeta = ConsensusMetadata::load(&h.fs, TABLET, &NodeId::new(LOCAL)).unwrap();
    assert_eq!(cmeta.current_term(), Term::new(9));
    assert_eq!(
        TabletMetadata::load(&h.fs, TABLET).unwrap().data_state(),
        TabletDataState::Tombstoned
    );
    assert!(h.fs.block_manager().exists(old_block));
}

#[tokio::test]
async fn test_corrupt_block_chunk_discards_copy() {
    let peer = ScriptedPeer::new(&[1, 2], 4);
    let bad = DataId::Block {
        id: peer.superblock.block_ids()[2],
    };
    peer.faults.lock().corrupt = Some(bad.clone());
    let h = Harness::new(peer);

    let mut client = h.client();
    let (uuid, addr) = h.source();
    let err = client.run(&uuid, &addr).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataCorruption);
    assert_eq!(client.state(), SessionState::Ended);
    assert!(!client.progress().succeeded);
    assert_eq!(h.peer.end_calls(), vec![false]);

    assert_eq!(h.peer.fetched_items().last(), Some(&bad));
    assert!(TabletMetadata::load(&h.fs, TABLET).unwrap_err().is_not_found());
    assert_eq!(h.count_entries("data/blocks"), 0);
    assert_eq!(h.count_entries("wals"), 0);
    assert!(h.status.last().unwrap().starts_with("RemoteBootstrap: Failed: "));
}

#[tokio::test]
async fn test_wal_failure_stops_later_segments() {
    let peer = ScriptedPeer::new(&[5, 6, 7], 1);
    peer.faults.lock().missing = Some(DataId::WalSegment { seqno: 6 });
    let h = Harness::new(peer);

    let mut client = h.client();
    let (uuid, addr) = h.source();
    client.start(&uuid, &addr).await.unwrap();
    let err = client.download_wals().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
    assert_eq!(
        h.peer.fetched_items(),
        vec![DataId::WalSegment { seqno: 5 }, DataId::WalSegment { seqno: 6 }]
    );
    assert_eq!(client.progress().wal_segments_downloaded, 1);
    assert_eq!(client.state(), SessionState::Ended);
    assert_eq!(h.peer.end_calls(), vec![false]);
}

#[tokio::test]
async fn test_missing_block_is_not_found() {
    let mut peer = ScriptedPeer::new(&[1], 3);
    let gone = peer.superblock.block_ids()[1];
    peer.blocks.remove(&gone);
    let h = Harness::new(peer);

    let mut client = h.client();
    let (uuid, addr) = h.source();
    let err = client.run(&uuid, &addr).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.count_entries("data/blocks"), 0);
}

#[tokio::test]
async fn test_chunk_past_declared_total_is_rejected() {
    let peer = ScriptedPeer::new(&[1], 1);
    peer.faults.lock().short_total = Some(DataId::StorageFile {
        name: "000011.sst".to_string(),
    });
    let h = Harness::new(peer);

    let mut client = h.client();
    let (uuid, addr) = h.source();
    let err = client.run(&uuid, &addr).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataCorruption);
    assert_eq!(client.progress().storage_files_downloaded, 0);
    assert_eq!(h.count_entries("data/storage"), 0);
}

#[tokio::test]
async fn test_unknown_tablet_is_not_found() {
    let peer = ScriptedPeer::new(&[1], 1);
    peer.faults.lock().begin_error = Some(RemoteBootstrapErrorCode::TabletNotFound);
    let h = Harness::new(peer);

    let mut client = h.client();
    let (uuid, addr) = h.source();
    let err = client.start(&uuid, &addr).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(client.state(), SessionState::Ended);
    assert!(h.peer.end_calls().is_empty());
}

#[tokio::test]
async fn test_unreachable_peer_is_remote_unavailable() {
    let peer = ScriptedPeer::new(&[1], 1);
    peer.faults.lock().unreachable = true;
    let h = Harness::new(peer);

    let mut client = h.client();
    let (uuid, addr) = h.source();
    let err = client.start(&uuid, &addr).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
}

#[tokio::test]
async fn test_remote_not_ready_is_illegal_state() {
    let mut peer = ScriptedPeer::new(&[1], 1);
    peer.superblock.data_state = TabletDataState::Copying;
    let h = Harness::new(peer);

    let mut client = h.client();
    let (uuid, addr) = h.source();
    let err = client.start(&uuid, &addr).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert_eq!(h.peer.end_calls(), vec![false]);
    assert_eq!(h.count_entries("wals"), 0);
}

#[tokio::test]
async fn test_abort_before_finalize_keeps_old_replica() {
    let h = Harness::new(ScriptedPeer::new(&[1, 2], 2));
    let (meta, old_block) = tombstoned_replica(&h.fs, 2);
    let meta_path = h.fs.tablet_metadata_path(TABLET).unwrap();
    let cmeta_path = h.fs.consensus_metadata_path(TABLET).unwrap();
    let meta_before = read_record(&meta_path);
    let cmeta_before = read_record(&cmeta_path);

    let mut client = h.client();
    client.set_tablet_to_replace(meta, Term::new(3)).unwrap();
    let (uuid, addr) = h.source();
    client.start(&uuid, &addr).await.unwrap();
    client.fetch_all().await.unwrap();
    client.abort().await;

    assert_eq!(client.state(), SessionState::Ended);
    assert_eq!(h.peer.end_calls(), vec![false]);
    assert_eq!(read_record(&meta_path), meta_before);
    assert_eq!(read_record(&cmeta_path), cmeta_before);
    assert!(h.fs.block_manager().exists(old_block));
    assert_eq!(h.fs.block_manager().block_ids().unwrap(), vec![old_block]);

    let err = client.finish().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
}

#[tokio::test]
async fn test_abort_after_finalize_has_no_effect() {
    let h = Harness::new(ScriptedPeer::new(&[1], 2));
    let mut client = h.client();
    let (uuid, addr) = h.source();
    client.start(&uuid, &addr).await.unwrap();
    client.fetch_all().await.unwrap();
    client.finish().await.unwrap();
    assert_eq!(client.state(), SessionState::Finalized);

    client.abort().await;
    assert_eq!(client.state(), SessionState::Finalized);
    assert!(h.peer.end_calls().is_empty());
    assert_eq!(TabletMetadata::load(&h.fs, TABLET).unwrap().data_state(), TabletDataState::Ready);

    client.end_session().await;
    assert_eq!(client.state(), SessionState::Ended);
    assert_eq!(h.peer.end_calls(), vec![true]);
}

#[tokio::test]
async fn test_cancellation_stops_fetching() {
    let h = Harness::new(ScriptedPeer::new(&[1, 2], 1));
    let mut client = h.client();
    let (uuid, addr) = h.source();
    client.start(&uuid, &addr).await.unwrap();
    client.cancellation_token().cancel();
    let err = client.download_wals().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Aborted);
    assert!(h.peer.fetched_items().is_empty());
    assert_eq!(h.peer.end_calls(), vec![false]);
}

#[tokio::test]
async fn test_dropping_unfinished_session_ends_it() {
    let h = Harness::new(ScriptedPeer::new(&[1, 2], 1));
    let mut client = h.client();
    let (uuid, addr) = h.source();
    client.start(&uuid, &addr).await.unwrap();
    client.download_wals().await.unwrap();
    assert!(h.count_entries("wals") > 0);
    drop(client);

    for _ in 0..10 {
        if !h.peer.end_calls().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(h.peer.end_calls(), vec![false]);
    assert_eq!(h.count_entries("wals"), 0);
}

#[tokio::test]
async fn test_verify_requires_committed_membership() {
    let h = Harness::new(ScriptedPeer::new(&[1], 1));
    let mut client = h.client();
    let (uuid, addr) = h.source();
    client.run(&uuid, &addr).await.unwrap();

    let cmeta = client.consensus_metadata().unwrap();
    let err = client.verify_remote_bootstrap_succeeded(cmeta).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert!(err.to_string().contains("change config not yet committed"));

    let mut promoted = ConsensusMetadata::load(&h.fs, TABLET, &NodeId::new(LOCAL)).unwrap();
    promoted.set_committed_config(raft_config(41, MemberType::Voter));
    client.verify_remote_bootstrap_succeeded(&promoted).unwrap();

    let mut evicted = promoted.clone();
    evicted.set_committed_config(tabletcopy_consensus::RaftConfig::default());
    let err = client.verify_remote_bootstrap_succeeded(&evicted).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_remote_superblock_for_other_tablet_is_rejected() {
    let mut peer = ScriptedPeer::new(&[1], 1);
    let mut other = TabletSuperblock::new("t2", "tbl-1", "orders");
    other.rowsets = peer.superblock.rowsets.clone();
    peer.superblock = other;
    let h = Harness::new(peer);

    let mut client = h.client();
    let (uuid, addr) = h.source();
    // the peer only hosts t2, so the request for t1 fails as not found
    let err = client.start(&uuid, &addr).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
