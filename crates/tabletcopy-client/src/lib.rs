#![warn(missing_docs)]

//! tabletcopy client: remote bootstrap of a tablet replica from a healthy peer
//!
//! A [`RemoteBootstrapClient`] opens a session on a peer that hosts the
//! tablet, streams its WAL segments, data blocks and storage-engine files in
//! verified chunks into directories private to the copy, and then installs
//! the copy by committing a new superblock and new consensus metadata in
//! place of the local, tombstoned replica.

pub mod cli;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod messages;
pub mod proxy;
pub mod reconciler;
pub mod session;
pub mod status;
pub mod verifier;

pub use config::{ChunkRetryPolicy, ConfigError, CopyClientConfig, MAX_CHUNK_SIZE_BYTES};
pub use error::{CopyError, CopyResult, ErrorKind};
pub use fetcher::ChunkFetcher;
pub use messages::{
    BeginSessionRequest, BeginSessionResponse, DataChunk, DataId, EndSessionRequest, EndSessionResponse,
    FetchDataRequest, FetchDataResponse, RemoteBootstrapErrorCode, RemoteBootstrapErrorPb,
};
pub use proxy::{ProxyFactory, RemoteBootstrapProxy, TcpProxyFactory, TcpRemoteBootstrapProxy};
pub use reconciler::{BlockIdentityMap, ReplaceTarget};
pub use session::{RemoteBootstrapClient, SessionProgress, SessionState};
pub use status::{format_status, LoggingStatusListener, RecordingStatusListener, StatusListener, STATUS_PREFIX};
pub use verifier::verify_chunk;
