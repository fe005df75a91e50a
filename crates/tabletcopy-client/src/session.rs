//! The remote bootstrap session: one copy of one tablet from one peer.
//!
//! A session walks through a fixed sequence of phases:
//!
//! ```text
//! Created -> Started -> WalFetched -> DataFetched -> Finalized -> Ended
//!    \__________\___________\____________\
//!                                         -> Aborted -> Ended
//! ```
//!
//! Every public operation checks the current phase first. A call made too
//! early fails with `IllegalState`, a repeated call with `AlreadyInProgress`,
//! and neither changes the session. A failure inside a phase discards what
//! the copy wrote so far, ends the remote session unsuccessfully and leaves
//! the session `Ended`. Nothing the copy replaces is touched before
//! [`RemoteBootstrapClient::finish`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tabletcopy_consensus::{verify_peer_admitted, Consensus, ConsensusMetadata, ConsensusState, HostPort, NodeId, Term};
use tabletcopy_storage::{
    BlockId, FsManager, StorageFileMeta, StorageFileWriter, TabletDataState, TabletMetadata, TabletSuperblock,
    WalSegmentFile, WriteOptions,
};
use tabletcopy_transport::RetryExecutor;

use crate::config::CopyClientConfig;
use crate::error::{CopyError, CopyResult};
use crate::fetcher::ChunkFetcher;
use crate::messages::{BeginSessionRequest, DataId, EndSessionRequest};
use crate::proxy::{ProxyFactory, RemoteBootstrapProxy};
use crate::reconciler::{self, BlockIdentityMap, FinalizeInput, Installed, PreparedCopy, ReplaceTarget};
use crate::status::{format_status, StatusListener};

/// Phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    /// Nothing has been sent to the remote yet.
    Created,
    /// The remote session is open and the copy's directories exist.
    Started,
    /// Every WAL segment has been downloaded.
    WalFetched,
    /// Every block and storage-engine file has been downloaded.
    DataFetched,
    /// The copy has replaced the local tablet.
    Finalized,
    /// The copy failed or was cancelled and its files were discarded.
    Aborted,
    /// The remote session has been closed.
    Ended,
}

impl SessionState {
    fn ordinal(self) -> u8 {
        match self {
            SessionState::Created => 0,
            SessionState::Started => 1,
            SessionState::WalFetched => 2,
            SessionState::DataFetched => 3,
            SessionState::Finalized => 4,
            SessionState::Aborted => 5,
            SessionState::Ended => 6,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "CREATED",
            SessionState::Started => "STARTED",
            SessionState::WalFetched => "WAL_FETCHED",
            SessionState::DataFetched => "DATA_FETCHED",
            SessionState::Finalized => "FINALIZED",
            SessionState::Aborted => "ABORTED",
            SessionState::Ended => "ENDED",
        };
        f.write_str(s)
    }
}

/// Counters that only ever grow during a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    /// The remote accepted the session.
    pub session_started: bool,
    /// WAL segments downloaded.
    pub wal_segments_downloaded: usize,
    /// Data blocks downloaded.
    pub blocks_downloaded: usize,
    /// Storage-engine files downloaded.
    pub storage_files_downloaded: usize,
    /// Bytes written to local files.
    pub bytes_downloaded: u64,
    /// The copy was installed.
    pub succeeded: bool,
}

/// Open session on the remote peer.
///
/// The remote is told the session is over exactly once: through
/// [`end`](Self::end) or, if the handle is dropped first, from `Drop`.
struct RemoteSession {
    proxy: Arc<dyn RemoteBootstrapProxy>,
    session_id: String,
    idle_timeout: Duration,
    succeeded: bool,
    ended: bool,
    log_prefix: String,
}

impl RemoteSession {
    fn new(proxy: Arc<dyn RemoteBootstrapProxy>, session_id: String, idle_timeout: Duration, log_prefix: String) -> Self {
        Self {
            proxy,
            session_id,
            idle_timeout,
            succeeded: false,
            ended: false,
            log_prefix,
        }
    }

    fn end_request(&self) -> EndSessionRequest {
        EndSessionRequest {
            session_id: self.session_id.clone(),
            is_success: self.succeeded,
        }
    }

    async fn end(mut self) {
        self.ended = true;
        let req = self.end_request();
        match self.proxy.end_session(req).await {
            Ok(_) => debug!(
                prefix = %self.log_prefix,
                session_id = %self.session_id,
                is_success = self.succeeded,
                "ended remote bootstrap session"
            ),
            Err(e) => warn!(
                prefix = %self.log_prefix,
                session_id = %self.session_id,
                error = %e,
                "unable to end remote bootstrap session"
            ),
        }
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        let req = self.end_request();
        let proxy = Arc::clone(&self.proxy);
        let log_prefix = self.log_prefix.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = proxy.end_session(req).await {
                        warn!(prefix = %log_prefix, error = %e, "unable to end dropped remote bootstrap session");
                    }
                });
            }
            Err(_) => warn!(
                prefix = %self.log_prefix,
                session_id = %self.session_id,
                "no runtime to end dropped remote bootstrap session, leaving it to expire"
            ),
        }
    }
}

/// Copies one tablet from a remote peer into the local data root.
///
/// Typical use:
///
/// ```ignore
/// let mut client = RemoteBootstrapClient::new(tablet_id, local_uuid, fs, proxies, config, status);
/// client.set_tablet_to_replace(tombstoned_meta, caller_term)?;
/// client.run(&source_uuid, &source_addr).await?;
/// if let Some(cmeta) = client.consensus_metadata() {
///     client.verify_remote_bootstrap_succeeded(cmeta)?;
/// }
/// ```
pub struct RemoteBootstrapClient {
    tablet_id: String,
    local_uuid: NodeId,
    fs: Arc<FsManager>,
    proxies: Arc<dyn ProxyFactory>,
    config: CopyClientConfig,
    status: Arc<dyn StatusListener>,
    log_prefix: String,
    cancel: CancellationToken,

    state: SessionState,
    progress: SessionProgress,
    started_at: Option<Instant>,

    replace: Option<ReplaceTarget>,
    old_cmeta: Option<ConsensusMetadata>,

    session: Option<RemoteSession>,
    remote_superblock: Option<TabletSuperblock>,
    remote_cstate: Option<ConsensusState>,
    chunk_size: u64,

    prepared: Option<PreparedCopy>,
    blocks: BlockIdentityMap,
    installed: Option<Installed>,
}

impl RemoteBootstrapClient {
    /// Creates a session that will copy `tablet_id` onto the server `local_uuid`.
    pub fn new(
        tablet_id: impl Into<String>,
        local_uuid: NodeId,
        fs: Arc<FsManager>,
        proxies: Arc<dyn ProxyFactory>,
        config: CopyClientConfig,
        status: Arc<dyn StatusListener>,
    ) -> Self {
        let tablet_id = tablet_id.into();
        let log_prefix = format!("T {} P {}: ", tablet_id, local_uuid);
        Self {
            tablet_id,
            local_uuid,
            fs,
            proxies,
            config,
            status,
            log_prefix,
            cancel: CancellationToken::new(),
            state: SessionState::Created,
            progress: SessionProgress::default(),
            started_at: None,
            replace: None,
            old_cmeta: None,
            session: None,
            remote_superblock: None,
            remote_cstate: None,
            chunk_size: 0,
            prepared: None,
            blocks: BlockIdentityMap::new(),
            installed: None,
        }
    }

    /// Tablet being copied.
    pub fn tablet_id(&self) -> &str {
        &self.tablet_id
    }

    /// Prefix of every log line of this session.
    pub fn log_prefix(&self) -> &str {
        &self.log_prefix
    }

    /// Current phase.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Progress so far.
    pub fn progress(&self) -> &SessionProgress {
        &self.progress
    }

    /// Remote block to local block assignments made so far.
    pub fn block_map(&self) -> &BlockIdentityMap {
        &self.blocks
    }

    /// Time since the session started.
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    /// Token another task can cancel to stop the copy at the next chunk.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Installed tablet metadata, once finalized.
    pub fn metadata(&self) -> Option<&TabletMetadata> {
        self.installed.as_ref().map(|i| &i.metadata)
    }

    /// Installed consensus metadata, once finalized.
    pub fn consensus_metadata(&self) -> Option<&ConsensusMetadata> {
        self.installed.as_ref().map(|i| &i.cmeta)
    }

    /// Makes the copy replace the existing, tombstoned replica described by
    /// `metadata`. Must be called before [`start`](Self::start).
    ///
    /// Without a replace target the copy creates a brand-new replica and no
    /// term check is made; [`start`](Self::start) then fails if the tablet
    /// already has local metadata or consensus metadata.
    pub fn set_tablet_to_replace(&mut self, metadata: TabletMetadata, caller_term: Term) -> CopyResult<()> {
        self.expect_state(SessionState::Created, "set tablet to replace")?;
        if self.replace.is_some() {
            return Err(CopyError::AlreadyInProgress(format!(
                "tablet to replace already set for {}",
                self.tablet_id
            )));
        }
        debug!(
            prefix = %self.log_prefix,
            caller_term = %caller_term,
            data_state = %metadata.data_state(),
            "set tablet to replace"
        );
        self.replace = Some(ReplaceTarget { metadata, caller_term });
        Ok(())
    }

    /// Opens a session with `source_uuid` at `source_addr`.
    ///
    /// When replacing a replica, the caller's term is checked against the
    /// local consensus metadata before the remote is contacted.
    pub async fn start(&mut self, source_uuid: &NodeId, source_addr: &HostPort) -> CopyResult<()> {
        self.expect_state(SessionState::Created, "start remote bootstrap")?;
        match self.begin(source_uuid, source_addr).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn begin(&mut self, source_uuid: &NodeId, source_addr: &HostPort) -> CopyResult<()> {
        match &self.replace {
            Some(target) => {
                self.old_cmeta =
                    reconciler::validate_replacement(&self.fs, &self.tablet_id, &self.local_uuid, target)?;
            }
            None => reconciler::ensure_no_local_replica(&self.fs, &self.tablet_id)?,
        }
        self.check_cancelled("start")?;
        self.started_at = Some(Instant::now());
        self.report(&format!(
            "Beginning remote bootstrap session from remote peer {} at {}",
            source_uuid, source_addr
        ));

        let proxy = self
            .proxies
            .new_proxy(source_uuid, source_addr)
            .await
            .map_err(|e| CopyError::from_remote(&format!("unable to reach peer {} at {}", source_uuid, source_addr), e))?;
        let req = BeginSessionRequest {
            requestor_uuid: self.local_uuid.to_string(),
            tablet_id: self.tablet_id.clone(),
        };
        let resp = proxy.begin_session(req).await.map_err(|e| {
            CopyError::from_remote(
                &format!("unable to begin remote bootstrap session with peer {}", source_uuid),
                e,
            )
        })?;
        self.session = Some(RemoteSession::new(
            proxy,
            resp.session_id.clone(),
            Duration::from_millis(resp.session_idle_timeout_millis),
            self.log_prefix.clone(),
        ));
        info!(
            prefix = %self.log_prefix,
            session_id = %resp.session_id,
            source = %source_uuid,
            wal_segments = resp.wal_segment_seqnos.len(),
            blocks = resp.superblock.num_blocks(),
            storage_files = resp.superblock.storage_files.len(),
            "began remote bootstrap session"
        );

        let superblock = resp.superblock;
        if superblock.tablet_id != self.tablet_id {
            return Err(CopyError::IllegalState(format!(
                "remote peer {} returned superblock of tablet {} for tablet {}",
                source_uuid, superblock.tablet_id, self.tablet_id
            )));
        }
        if superblock.data_state != TabletDataState::Ready {
            return Err(CopyError::IllegalState(format!(
                "remote tablet {} on peer {} is {}, expected {}",
                self.tablet_id,
                source_uuid,
                superblock.data_state,
                TabletDataState::Ready
            )));
        }

        self.chunk_size = self.config.effective_chunk_size(resp.max_chunk_size);
        self.prepared = Some(reconciler::prepare(&self.fs, &superblock, &resp.wal_segment_seqnos)?);
        self.remote_superblock = Some(superblock);
        self.remote_cstate = Some(resp.initial_committed_cstate);
        self.progress.session_started = true;
        self.state = SessionState::Started;
        Ok(())
    }

    /// Downloads WAL segments, then blocks and storage-engine files.
    pub async fn fetch_all(&mut self) -> CopyResult<()> {
        self.download_wals().await?;
        self.download_data().await
    }

    /// Downloads every WAL segment in order. The first failure ends the
    /// phase; later segments are never requested.
    pub async fn download_wals(&mut self) -> CopyResult<()> {
        self.expect_state(SessionState::Started, "download WAL segments")?;
        match self.fetch_wal_segments().await {
            Ok(()) => {
                self.state = SessionState::WalFetched;
                Ok(())
            }
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn fetch_wal_segments(&mut self) -> CopyResult<()> {
        let (wal_dir, seqnos) = {
            let prepared = self.prepared()?;
            (prepared.wal_dir.clone(), prepared.wal_seqnos.clone())
        };
        let (proxy, session_id, idle_timeout) = self.session_parts()?;
        let cancel = self.cancel.clone();
        let prefix = self.log_prefix.clone();
        let fetcher = ChunkFetcher::new(
            proxy.as_ref(),
            &session_id,
            self.chunk_size,
            idle_timeout,
            self.retry_executor(),
            &cancel,
            &prefix,
        );

        let total = seqnos.len();
        for (i, seqno) in seqnos.into_iter().enumerate() {
            self.report(&format!("Downloading WAL segment {} ({}/{})", seqno, i + 1, total));
            let mut segment = WalSegmentFile::create(&wal_dir, seqno, self.write_options())?;
            let bytes = fetcher.fetch(&DataId::WalSegment { seqno }, &mut segment).await?;
            self.progress.wal_segments_downloaded += 1;
            self.progress.bytes_downloaded += bytes;
        }
        info!(prefix = %self.log_prefix, segments = total, "downloaded WAL segments");
        Ok(())
    }

    /// Downloads every block into a newly allocated local block, then every
    /// storage-engine file.
    pub async fn download_data(&mut self) -> CopyResult<()> {
        self.expect_state(SessionState::WalFetched, "download data")?;
        match self.fetch_data_items().await {
            Ok(()) => {
                self.state = SessionState::DataFetched;
                Ok(())
            }
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn fetch_data_items(&mut self) -> CopyResult<()> {
        let remote = self
            .remote_superblock
            .clone()
            .ok_or_else(|| CopyError::IllegalState("no remote superblock".to_string()))?;
        let data_dir = self.prepared()?.data_dir.clone();
        let (proxy, session_id, idle_timeout) = self.session_parts()?;
        let cancel = self.cancel.clone();
        let prefix = self.log_prefix.clone();
        let fetcher = ChunkFetcher::new(
            proxy.as_ref(),
            &session_id,
            self.chunk_size,
            idle_timeout,
            self.retry_executor(),
            &cancel,
            &prefix,
        );

        let remote_blocks: Vec<BlockId> = remote.block_ids();
        let total = remote_blocks.len();
        for (i, remote_id) in remote_blocks.into_iter().enumerate() {
            if let Some(local) = self.blocks.get(remote_id) {
                return Err(CopyError::DataCorruption(format!(
                    "remote superblock lists block {} more than once (stored as {})",
                    remote_id, local
                )));
            }
            self.report(&format!("Downloading block {} ({}/{})", remote_id, i + 1, total));
            let mut block = self.fs.block_manager().create_block(self.write_options())?;
            self.blocks.insert(remote_id, block.id())?;
            let bytes = fetcher.fetch(&DataId::Block { id: remote_id }, &mut block).await?;
            debug!(prefix = %self.log_prefix, remote = %remote_id, local = %block.id(), bytes, "stored block");
            self.progress.blocks_downloaded += 1;
            self.progress.bytes_downloaded += bytes;
        }
        let rowsets = self.blocks.remap_rowsets(&remote.rowsets)?;

        let total = remote.storage_files.len();
        let mut storage_files = Vec::with_capacity(total);
        for (i, file) in remote.storage_files.iter().enumerate() {
            self.report(&format!("Downloading storage file {} ({}/{})", file.name, i + 1, total));
            let mut writer = StorageFileWriter::create(&data_dir, &file.name, self.write_options())?;
            let data_id = DataId::StorageFile {
                name: file.name.clone(),
            };
            let bytes = fetcher.fetch(&data_id, &mut writer).await?;
            if bytes != file.size_bytes {
                return Err(CopyError::DataCorruption(format!(
                    "{}: downloaded {} bytes, remote superblock lists {}",
                    data_id, bytes, file.size_bytes
                )));
            }
            storage_files.push(StorageFileMeta {
                name: file.name.clone(),
                size_bytes: bytes,
            });
            self.progress.storage_files_downloaded += 1;
            self.progress.bytes_downloaded += bytes;
        }

        let prepared = self
            .prepared
            .as_mut()
            .ok_or_else(|| CopyError::IllegalState("copy not prepared".to_string()))?;
        prepared.superblock.rowsets = rowsets;
        prepared.superblock.storage_files = storage_files;
        info!(
            prefix = %self.log_prefix,
            blocks = self.progress.blocks_downloaded,
            storage_files = self.progress.storage_files_downloaded,
            bytes = self.progress.bytes_downloaded,
            "downloaded tablet data"
        );
        Ok(())
    }

    /// Installs the copy in place of the local tablet. Once this returns
    /// `Ok` the copy can no longer be aborted.
    pub async fn finish(&mut self) -> CopyResult<()> {
        self.expect_state(SessionState::DataFetched, "finalize remote bootstrap")?;
        if let Err(e) = self.check_cancelled("finalize") {
            return Err(self.fail(e).await);
        }
        match self.install() {
            Ok(installed) => {
                self.prepared = None;
                self.installed = Some(installed);
                self.state = SessionState::Finalized;
                self.progress.succeeded = true;
                if let Some(session) = self.session.as_mut() {
                    session.succeeded = true;
                }
                info!(
                    prefix = %self.log_prefix,
                    elapsed_ms = self.elapsed().map(|d| d.as_millis() as u64).unwrap_or(0),
                    "remote bootstrap finalized"
                );
                self.report("Remote bootstrap complete");
                Ok(())
            }
            Err(e) => Err(self.fail(e).await),
        }
    }

    fn install(&mut self) -> CopyResult<Installed> {
        let old_metadata = self.replace.take().map(|t| t.metadata);
        let old_cmeta = self.old_cmeta.take();
        self.report("Writing tablet and consensus metadata");
        let superblock = self.prepared()?.superblock.clone();
        let remote_cstate = self
            .remote_cstate
            .as_ref()
            .ok_or_else(|| CopyError::IllegalState("no remote consensus state".to_string()))?;
        reconciler::finalize(
            &self.fs,
            FinalizeInput {
                local_uuid: &self.local_uuid,
                superblock,
                remote_cstate,
                old_metadata,
                old_cmeta,
            },
        )
    }

    /// Closes the remote session.
    ///
    /// After [`finish`](Self::finish) the remote is told the copy succeeded;
    /// before it this is the same as [`abort`](Self::abort). Calling it again
    /// does nothing.
    pub async fn end_session(&mut self) {
        match self.state {
            SessionState::Ended => debug!(prefix = %self.log_prefix, "remote bootstrap session already ended"),
            SessionState::Finalized => self.close_remote().await,
            _ => self.abort().await,
        }
    }

    /// Stops the copy, discards what it wrote and ends the remote session
    /// unsuccessfully. Has no effect once the copy is finalized.
    pub async fn abort(&mut self) {
        if matches!(self.state, SessionState::Finalized | SessionState::Ended) {
            debug!(prefix = %self.log_prefix, state = %self.state, "abort ignored");
            return;
        }
        self.cancel.cancel();
        self.report("Aborting remote bootstrap");
        self.discard_partial();
        self.state = SessionState::Aborted;
        self.close_remote().await;
    }

    /// Starts, fetches, finalizes and ends in one call.
    pub async fn run(&mut self, source_uuid: &NodeId, source_addr: &HostPort) -> CopyResult<()> {
        self.start(source_uuid, source_addr).await?;
        self.fetch_all().await?;
        self.finish().await?;
        self.end_session().await;
        Ok(())
    }

    /// Checks that `consensus` lists this server as a full member of the
    /// tablet's committed configuration.
    ///
    /// A copied replica that is still a pre-member has its data but the
    /// configuration change admitting it has not been committed.
    pub fn verify_remote_bootstrap_succeeded(&self, consensus: &dyn Consensus) -> CopyResult<()> {
        if !self.progress.succeeded {
            return Err(CopyError::IllegalState(format!(
                "remote bootstrap of tablet {} has not completed (session is {})",
                self.tablet_id, self.state
            )));
        }
        verify_peer_admitted(consensus)?;
        self.report("Remote bootstrap complete and config change committed");
        Ok(())
    }

    async fn fail(&mut self, err: CopyError) -> CopyError {
        warn!(
            prefix = %self.log_prefix,
            state = %self.state,
            kind = %err.kind(),
            error = %err,
            "remote bootstrap failed"
        );
        self.report(&format!("Failed: {}", err));
        self.discard_partial();
        self.state = SessionState::Aborted;
        self.close_remote().await;
        err
    }

    async fn close_remote(&mut self) {
        if let Some(session) = self.session.take() {
            session.end().await;
        }
        self.state = SessionState::Ended;
    }

    fn discard_partial(&mut self) {
        if let Some(prepared) = self.prepared.take() {
            reconciler::discard(&self.fs, &prepared, &self.blocks);
        }
    }

    fn expect_state(&self, expected: SessionState, op: &str) -> CopyResult<()> {
        if self.state == expected {
            return Ok(());
        }
        match self.state {
            SessionState::Aborted | SessionState::Ended => Err(CopyError::IllegalState(format!(
                "cannot {}: session is {}",
                op, self.state
            ))),
            s if s.ordinal() > expected.ordinal() => Err(CopyError::AlreadyInProgress(format!(
                "cannot {}: session is already {}",
                op, s
            ))),
            s => Err(CopyError::IllegalState(format!(
                "cannot {}: session is {}, expected {}",
                op, s, expected
            ))),
        }
    }

    fn check_cancelled(&self, op: &str) -> CopyResult<()> {
        if self.cancel.is_cancelled() {
            return Err(CopyError::Aborted(format!("{} of tablet {} cancelled", op, self.tablet_id)));
        }
        Ok(())
    }

    fn prepared(&self) -> CopyResult<&PreparedCopy> {
        self.prepared
            .as_ref()
            .ok_or_else(|| CopyError::IllegalState("copy not prepared".to_string()))
    }

    fn session_parts(&self) -> CopyResult<(Arc<dyn RemoteBootstrapProxy>, String, Duration)> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| CopyError::IllegalState("no remote session".to_string()))?;
        Ok((Arc::clone(&session.proxy), session.session_id.clone(), session.idle_timeout))
    }

    fn retry_executor(&self) -> RetryExecutor {
        RetryExecutor::new(self.config.chunk_retry.to_retry_config())
    }

    fn write_options(&self) -> WriteOptions {
        WriteOptions {
            sync_on_close: self.config.force_fsync,
        }
    }

    fn report(&self, message: &str) {
        let status = format_status(message);
        debug!(prefix = %self.log_prefix, status = %status, "status");
        self.status.status_message(&status);
    }
}

impl Drop for RemoteBootstrapClient {
    fn drop(&mut self) {
        if matches!(
            self.state,
            SessionState::Started | SessionState::WalFetched | SessionState::DataFetched
        ) {
            warn!(prefix = %self.log_prefix, state = %self.state, "dropping unfinished remote bootstrap");
            self.discard_partial();
        }
        // An open `RemoteSession` ends itself when dropped.
    }
}
