#![warn(missing_docs)]

//! tabletcopy storage subsystem: local block manager, WAL segment files, tablet superblocks
//!
//! This crate provides the local storage provider used when a tablet replica
//! is copied from a remote peer. Downloaded data lands in append-only sinks
//! (blocks, WAL segments, storage-engine files) and tablet/consensus records
//! are replaced atomically through staged writes.

pub mod atomic_write;
pub mod block;
pub mod block_manager;
pub mod checksum;
pub mod error;
pub mod fs_manager;
pub mod sink;
pub mod storage_file;
pub mod superblock;
pub mod tablet_metadata;
pub mod wal;

pub use atomic_write::{sync_dir, write_atomic, StagedFile};
pub use block::BlockId;
pub use block_manager::{FileBlockManager, WritableBlock};
pub use checksum::{Checksum, ChecksumAlgorithm};
pub use error::{StorageError, StorageResult};
pub use fs_manager::FsManager;
pub use sink::{WritableSink, WriteOptions};
pub use storage_file::StorageFileWriter;
pub use superblock::{RowSetMeta, StorageFileMeta, TabletDataState, TabletSuperblock, SUPERBLOCK_MAGIC, SUPERBLOCK_VERSION};
pub use tablet_metadata::TabletMetadata;
pub use wal::WalSegmentFile;
