//! Command line interface of the `tabletcopy` binary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use tabletcopy_consensus::{verify_peer_admitted, ConsensusMetadata, HostPort, NodeId, Term};
use tabletcopy_storage::{FsManager, TabletMetadata};

use crate::config::CopyClientConfig;
use crate::proxy::TcpProxyFactory;
use crate::session::RemoteBootstrapClient;
use crate::status::LoggingStatusListener;

/// Parsed command line.
#[derive(Parser)]
#[command(name = "tabletcopy")]
#[command(about = "Copy a tablet replica from a healthy peer", long_about = None)]
pub struct Cli {
    /// Data root of the local tablet server.
    #[arg(long, env = "TABLETCOPY_FS_ROOT")]
    pub fs_root: PathBuf,

    /// Uuid of the local tablet server.
    #[arg(long, env = "TABLETCOPY_NODE_UUID")]
    pub node_uuid: String,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Copy a tablet from a remote peer.
    Copy {
        /// Tablet to copy.
        #[arg(long)]
        tablet_id: String,
        /// Uuid of the peer to copy from.
        #[arg(long)]
        source_uuid: String,
        /// Address of the peer, as host:port.
        #[arg(long)]
        source_addr: String,
        /// Term of the caller; required when a tombstoned replica is replaced.
        #[arg(long)]
        caller_term: Option<u64>,
        /// Client configuration file (.toml or .json).
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print the session progress as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Check that the local replica is a full member of its committed config.
    Verify {
        /// Tablet to check.
        #[arg(long)]
        tablet_id: String,
    },
}

impl Cli {
    /// Runs the selected subcommand.
    pub async fn run(self) -> Result<()> {
        let fs = Arc::new(
            FsManager::open(&self.fs_root)
                .with_context(|| format!("opening data root {}", self.fs_root.display()))?,
        );
        let node_uuid = NodeId::new(self.node_uuid);
        match self.command {
            Command::Copy {
                tablet_id,
                source_uuid,
                source_addr,
                caller_term,
                config,
                json,
            } => {
                let config = load_config(config.as_deref())?;
                let source_addr = HostPort::parse(&source_addr)?;
                copy(
                    fs,
                    node_uuid,
                    &tablet_id,
                    &NodeId::new(source_uuid),
                    &source_addr,
                    caller_term.map(Term::new),
                    config,
                    json,
                )
                .await
            }
            Command::Verify { tablet_id } => verify(&fs, &node_uuid, &tablet_id),
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<CopyClientConfig> {
    match path {
        Some(path) => CopyClientConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(CopyClientConfig::default()),
    }
}

#[allow(clippy::too_many_arguments)]
async fn copy(
    fs: Arc<FsManager>,
    node_uuid: NodeId,
    tablet_id: &str,
    source_uuid: &NodeId,
    source_addr: &HostPort,
    caller_term: Option<Term>,
    config: CopyClientConfig,
    json: bool,
) -> Result<()> {
    let existing = match TabletMetadata::load(&fs, tablet_id) {
        Ok(meta) => Some(meta),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e).context("loading local tablet metadata"),
    };

    let proxies = Arc::new(TcpProxyFactory::new(&config));
    let mut client = RemoteBootstrapClient::new(
        tablet_id,
        node_uuid,
        fs,
        proxies,
        config,
        Arc::new(LoggingStatusListener),
    );
    if let Some(meta) = existing {
        let Some(term) = caller_term else {
            bail!(
                "tablet {} exists locally in state {}; --caller-term is required to replace it",
                tablet_id,
                meta.data_state()
            );
        };
        client.set_tablet_to_replace(meta, term)?;
    }

    let result = client.run(source_uuid, source_addr).await;
    if json {
        println!("{}", serde_json::to_string_pretty(client.progress())?);
    }
    result?;

    let progress = client.progress();
    println!("Tablet: {}", tablet_id);
    println!("WAL segments: {}", progress.wal_segments_downloaded);
    println!("Blocks: {}", progress.blocks_downloaded);
    println!("Storage files: {}", progress.storage_files_downloaded);
    println!("Bytes: {}", progress.bytes_downloaded);

    if let Some(cmeta) = client.consensus_metadata() {
        match client.verify_remote_bootstrap_succeeded(cmeta) {
            Ok(()) => println!("Membership: committed"),
            Err(e) => {
                warn!(error = %e, "copy installed but membership not yet committed");
                println!("Membership: pending ({})", e);
            }
        }
    }
    info!(tablet_id, "copy finished");
    Ok(())
}

fn verify(fs: &FsManager, node_uuid: &NodeId, tablet_id: &str) -> Result<()> {
    let cmeta = ConsensusMetadata::load(fs, tablet_id, node_uuid)
        .with_context(|| format!("loading consensus metadata of tablet {}", tablet_id))?;
    verify_peer_admitted(&cmeta)?;
    println!("Tablet {}: peer {} is a committed member", tablet_id, node_uuid);
    Ok(())
}
