//! In-memory remote peer shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use tabletcopy_client::messages::{decode, encode};
use tabletcopy_client::{
    BeginSessionRequest, BeginSessionResponse, CopyClientConfig, DataChunk, DataId, EndSessionRequest,
    EndSessionResponse, FetchDataRequest, FetchDataResponse, ProxyFactory, RecordingStatusListener,
    RemoteBootstrapClient, RemoteBootstrapErrorCode, RemoteBootstrapErrorPb, RemoteBootstrapProxy,
};
use tabletcopy_consensus::{ConsensusState, HostPort, MemberType, NodeId, RaftConfig, RaftPeer, Term};
use tabletcopy_storage::checksum::{self, ChecksumAlgorithm};
use tabletcopy_storage::{BlockId, FsManager, RowSetMeta, StorageFileMeta, TabletDataState, TabletSuperblock};
use tabletcopy_transport::{Opcode, Result as TransportResult, RpcErrorStatus, RpcHandler, TransportError};

pub const TABLET: &str = "t1";
pub const LOCAL: &str = "ts-local";
pub const REMOTE: &str = "ts-remote";

/// One call received by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Begin,
    Fetch { data_id: DataId, offset: u64 },
    End { is_success: bool },
}

/// Misbehaviour injected into the peer.
#[derive(Debug, Default)]
pub struct Faults {
    /// Requests for this item fail with a service error.
    pub missing: Option<DataId>,
    /// The first chunk of this item is damaged in transit.
    pub corrupt: Option<DataId>,
    /// This item reports a total length 20 bytes shorter than it is.
    pub short_total: Option<DataId>,
    /// BeginSession fails with this code.
    pub begin_error: Option<RemoteBootstrapErrorCode>,
    /// Every call fails at the transport level.
    pub unreachable: bool,
}

/// A peer hosting one tablet.
pub struct ScriptedPeer {
    pub superblock: TabletSuperblock,
    pub cstate: ConsensusState,
    pub wal: BTreeMap<u64, Vec<u8>>,
    pub blocks: HashMap<BlockId, Vec<u8>>,
    pub files: HashMap<String, Vec<u8>>,
    pub max_chunk_size: u64,
    pub faults: Mutex<Faults>,
    pub calls: Mutex<Vec<Call>>,
}

fn item(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// Raft config with the remote as voter and the local server as `local_type`.
pub fn raft_config(opid_index: u64, local_type: MemberType) -> RaftConfig {
    RaftConfig {
        opid_index: Some(opid_index),
        peers: vec![
            RaftPeer::new(REMOTE, MemberType::Voter, Some(HostPort::new("10.0.0.1", 9100))),
            RaftPeer::new(LOCAL, local_type, Some(HostPort::new("10.0.0.2", 9100))),
        ],
    }
}

impl ScriptedPeer {
    /// Tablet with WAL segments `wal_seqnos`, `num_blocks` blocks split over
    /// two row sets and one storage-engine file.
    pub fn new(wal_seqnos: &[u64], num_blocks: u64) -> Self {
        let mut superblock = TabletSuperblock::new(TABLET, "tbl-1", "orders");
        let mut blocks = HashMap::new();
        let mut rowsets = vec![
            RowSetMeta { id: 0, blocks: Vec::new() },
            RowSetMeta { id: 1, blocks: Vec::new() },
        ];
        for i in 0..num_blocks {
            let id = BlockId::new(0x1000 + i);
            blocks.insert(id, item(10 + i as usize * 7, i as u8));
            rowsets[(i % 2) as usize].blocks.push(id);
        }
        superblock.rowsets = rowsets;

        let mut files = HashMap::new();
        let sst = item(33, 200);
        superblock.storage_files.push(StorageFileMeta {
            name: "000011.sst".to_string(),
            size_bytes: sst.len() as u64,
        });
        files.insert("000011.sst".to_string(), sst);

        let wal = wal_seqnos.iter().map(|&s| (s, item(25, s as u8))).collect();

        Self {
            superblock,
            cstate: ConsensusState {
                current_term: Term::new(6),
                leader_uuid: Some(NodeId::new(REMOTE)),
                config: raft_config(40, MemberType::PreVoter),
            },
            wal,
            blocks,
            files,
            max_chunk_size: 8,
            faults: Mutex::new(Faults::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn end_calls(&self) -> Vec<bool> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::End { is_success } => Some(is_success),
                _ => None,
            })
            .collect()
    }

    /// Distinct items requested, in first-request order.
    pub fn fetched_items(&self) -> Vec<DataId> {
        let mut items: Vec<DataId> = Vec::new();
        for call in self.calls() {
            if let Call::Fetch { data_id, .. } = call {
                if items.last() != Some(&data_id) {
                    items.push(data_id);
                }
            }
        }
        items
    }

    fn lookup(&self, data_id: &DataId) -> Result<&Vec<u8>, RemoteBootstrapErrorPb> {
        let found = match data_id {
            DataId::WalSegment { seqno } => self.wal.get(seqno),
            DataId::Block { id } => self.blocks.get(id),
            DataId::StorageFile { name } => self.files.get(name),
        };
        let code = match data_id {
            DataId::WalSegment { .. } => RemoteBootstrapErrorCode::WalSegmentNotFound,
            DataId::Block { .. } => RemoteBootstrapErrorCode::BlockNotFound,
            DataId::StorageFile { .. } => RemoteBootstrapErrorCode::StorageFileNotFound,
        };
        found.ok_or_else(|| RemoteBootstrapErrorPb::new(code, format!("no {}", data_id)))
    }

    pub fn serve_begin(&self, req: BeginSessionRequest) -> Result<BeginSessionResponse, RemoteBootstrapErrorPb> {
        self.calls.lock().push(Call::Begin);
        if let Some(code) = self.faults.lock().begin_error {
            return Err(RemoteBootstrapErrorPb::new(code, "begin refused"));
        }
        if req.tablet_id != self.superblock.tablet_id {
            return Err(RemoteBootstrapErrorPb::new(
                RemoteBootstrapErrorCode::TabletNotFound,
                format!("tablet {} not hosted", req.tablet_id),
            ));
        }
        Ok(BeginSessionResponse {
            session_id: format!("{}-{}", req.requestor_uuid, req.tablet_id),
            session_idle_timeout_millis: 60_000,
            superblock: self.superblock.clone(),
            initial_committed_cstate: self.cstate.clone(),
            wal_segment_seqnos: self.wal.keys().copied().collect(),
            max_chunk_size: self.max_chunk_size,
        })
    }

    pub fn serve_fetch(&self, req: FetchDataRequest) -> Result<FetchDataResponse, RemoteBootstrapErrorPb> {
        self.calls.lock().push(Call::Fetch {
            data_id: req.data_id.clone(),
            offset: req.offset,
        });
        let faults = self.faults.lock();
        if faults.missing.as_ref() == Some(&req.data_id) {
            return Err(RemoteBootstrapErrorPb::new(
                RemoteBootstrapErrorCode::IoError,
                format!("cannot read {}", req.data_id),
            ));
        }
        let bytes = self.lookup(&req.data_id)?;
        let total = bytes.len() as u64;
        if req.offset > total {
            return Err(RemoteBootstrapErrorPb::new(
                RemoteBootstrapErrorCode::InvalidRemoteBootstrapRequest,
                format!("offset {} past end {}", req.offset, total),
            ));
        }
        let len = req.max_length.min(self.max_chunk_size).max(1);
        let end = (req.offset + len).min(total);
        let data = bytes[req.offset as usize..end as usize].to_vec();
        let mut chunk = DataChunk {
            offset: req.offset,
            checksum: checksum::compute(ChecksumAlgorithm::Crc32, &data),
            data,
            total_data_length: total,
        };
        if faults.corrupt.as_ref() == Some(&req.data_id) && req.offset == 0 && !chunk.data.is_empty() {
            chunk.data[0] ^= 0x5a;
        }
        if faults.short_total.as_ref() == Some(&req.data_id) {
            chunk.total_data_length = total.saturating_sub(20);
        }
        Ok(FetchDataResponse { chunk })
    }

    pub fn serve_end(&self, req: EndSessionRequest) -> Result<EndSessionResponse, RemoteBootstrapErrorPb> {
        self.calls.lock().push(Call::End {
            is_success: req.is_success,
        });
        Ok(EndSessionResponse {})
    }
}

fn to_transport<T>(result: Result<T, RemoteBootstrapErrorPb>) -> TransportResult<T> {
    result.map_err(|pb| {
        let message = pb.message.clone();
        TransportError::Remote(RpcErrorStatus::application(message, encode(&pb).unwrap()))
    })
}

/// In-process proxy calling the peer directly.
pub struct DirectProxy {
    pub peer: Arc<ScriptedPeer>,
}

impl DirectProxy {
    fn check_reachable(&self) -> TransportResult<()> {
        if self.peer.faults.lock().unreachable {
            return Err(TransportError::ConnectionReset);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteBootstrapProxy for DirectProxy {
    async fn begin_session(&self, req: BeginSessionRequest) -> TransportResult<BeginSessionResponse> {
        self.check_reachable()?;
        to_transport(self.peer.serve_begin(req))
    }

    async fn fetch_data(&self, req: FetchDataRequest) -> TransportResult<FetchDataResponse> {
        self.check_reachable()?;
        to_transport(self.peer.serve_fetch(req))
    }

    async fn end_session(&self, req: EndSessionRequest) -> TransportResult<EndSessionResponse> {
        self.check_reachable()?;
        to_transport(self.peer.serve_end(req))
    }
}

/// Factory handing out [`DirectProxy`]s to one peer.
pub struct DirectFactory {
    pub peer: Arc<ScriptedPeer>,
}

#[async_trait]
impl ProxyFactory for DirectFactory {
    async fn new_proxy(&self, _uuid: &NodeId, _addr: &HostPort) -> TransportResult<Arc<dyn RemoteBootstrapProxy>> {
        Ok(Arc::new(DirectProxy {
            peer: Arc::clone(&self.peer),
        }))
    }
}

/// RPC handler serving the peer over the framed transport.
pub struct PeerService {
    pub peer: Arc<ScriptedPeer>,
}

fn reply<T: serde::Serialize>(result: Result<T, RemoteBootstrapErrorPb>) -> Result<Vec<u8>, RpcErrorStatus> {
    match result {
        Ok(resp) => Ok(encode(&resp).unwrap()),
        Err(pb) => Err(RpcErrorStatus::application(pb.message.clone(), encode(&pb).unwrap())),
    }
}

#[async_trait]
impl RpcHandler for PeerService {
    async fn handle(&self, opcode: Opcode, payload: Vec<u8>) -> Result<Vec<u8>, RpcErrorStatus> {
        let bad = |e: TransportError| {
            RpcErrorStatus::new(tabletcopy_transport::RpcErrorCode::InvalidRequest, e.to_string())
        };
        match opcode {
            Opcode::BeginSession => reply(self.peer.serve_begin(decode(&payload).map_err(bad)?)),
            Opcode::FetchData => reply(self.peer.serve_fetch(decode(&payload).map_err(bad)?)),
            Opcode::EndSession => reply(self.peer.serve_end(decode(&payload).map_err(bad)?)),
            Opcode::Ping => Ok(payload),
        }
    }
}

/// A local data root plus a client wired to `peer`.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub fs: Arc<FsManager>,
    pub peer: Arc<ScriptedPeer>,
    pub status: Arc<RecordingStatusListener>,
}

impl Harness {
    pub fn new(peer: ScriptedPeer) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fs = Arc::new(FsManager::open(dir.path()).unwrap());
        Self {
            dir,
            fs,
            peer: Arc::new(peer),
            status: Arc::new(RecordingStatusListener::new()),
        }
    }

    pub fn client(&self) -> RemoteBootstrapClient {
        RemoteBootstrapClient::new(
            TABLET,
            NodeId::new(LOCAL),
            Arc::clone(&self.fs),
            Arc::new(DirectFactory {
                peer: Arc::clone(&self.peer),
            }),
            CopyClientConfig::default(),
            self.status.clone(),
        )
    }

    pub fn source(&self) -> (NodeId, HostPort) {
        (NodeId::new(REMOTE), HostPort::new("10.0.0.1", 9100))
    }

    /// Number of entries below `sub` of the data root.
    pub fn count_entries(&self, sub: &str) -> usize {
        let path = self.dir.path().join(sub);
        if !path.exists() {
            return 0;
        }
        walk(&path)
    }
}

fn walk(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            let e = e.unwrap();
            if e.file_type().unwrap().is_dir() {
                walk(&e.path())
            } else {
                1
            }
        })
        .sum()
}

/// Persists a tombstoned replica of the tablet holding one old block, plus
/// consensus metadata at `term`.
pub fn tombstoned_replica(fs: &FsManager, term: u64) -> (tabletcopy_storage::TabletMetadata, BlockId) {
    use tabletcopy_storage::{WritableSink, WriteOptions};

    let mut block = fs.block_manager().create_block(WriteOptions::durable()).unwrap();
    block.append(b"old block").unwrap();
    block.close().unwrap();
    let old_block = block.id();

    let mut sb = TabletSuperblock::new(TABLET, "tbl-1", "orders");
    sb.rowsets.push(RowSetMeta {
        id: 0,
        blocks: vec![old_block],
    });
    sb.wal_dir = fs.create_wal_dir(TABLET, "old").unwrap().display().to_string();
    sb.data_dir = fs.create_data_dir(TABLET, "old").unwrap().display().to_string();
    sb.data_state = TabletDataState::Tombstoned;
    sb.tombstone_last_logged_index = Some(17);
    let mut meta = tabletcopy_storage::TabletMetadata::new_unpersisted(fs, sb.clone()).unwrap();
    meta.replace_superblock(sb).unwrap();

    tabletcopy_consensus::ConsensusMetadata::create(
        fs,
        TABLET,
        NodeId::new(LOCAL),
        raft_config(30, MemberType::Voter),
        Term::new(term),
    )
    .unwrap();
    (meta, old_block)
}
