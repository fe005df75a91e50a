//! Append-only sinks for downloaded data.
//!
//! Remote data items (WAL segments, data blocks, storage-engine files) are
//! streamed into local files through the [`WritableSink`] trait so a single
//! fetch engine can fill any of them.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};

/// Options applied when a sink file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// fsync the file when it is closed.
    pub sync_on_close: bool,
}

impl WriteOptions {
    /// Forced durability: the file is fsynced on close.
    pub fn durable() -> Self {
        Self {
            sync_on_close: true,
        }
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self::durable()
    }
}

/// A local destination that accepts bytes strictly in order.
///
/// `close` is idempotent and makes the data durable when the sink was opened
/// with [`WriteOptions::durable`]. `abandon` closes the sink and discards
/// whatever was written; it is used when a download fails part way.
pub trait WritableSink: Send {
    /// Append bytes at the current end of the sink.
    fn append(&mut self, data: &[u8]) -> StorageResult<()>;

    /// Total bytes appended so far.
    fn bytes_appended(&self) -> u64;

    /// Flush and close; fsyncs when durability was requested.
    fn close(&mut self) -> StorageResult<()>;

    /// Close without keeping the contents.
    fn abandon(&mut self) -> StorageResult<()>;

    /// Human-readable name for log lines.
    fn describe(&self) -> String;
}

/// Plain file used as the backing store of every sink in this crate.
#[derive(Debug)]
pub(crate) struct DurableFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
    options: WriteOptions,
}

impl DurableFile {
    /// Create a new file; fails if one already exists at `path`.
    pub(crate) fn create_new(path: &Path, options: WriteOptions) -> StorageResult<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        debug!(path = %path.display(), sync_on_close = options.sync_on_close, "opened file for write");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
            written: 0,
            options,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn append(&mut self, data: &[u8]) -> StorageResult<()> {
        let writer = self.writer.as_mut().ok_or_else(|| StorageError::SinkClosed {
            path: self.path.clone(),
        })?;
        writer.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    pub(crate) fn written(&self) -> u64 {
        self.written
    }

    pub(crate) fn close(&mut self) -> StorageResult<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.flush()?;
        if self.options.sync_on_close {
            writer.get_ref().sync_all()?;
        }
        debug!(path = %self.path.display(), bytes = self.written, "closed file");
        Ok(())
    }

    pub(crate) fn abandon(&mut self) -> StorageResult<()> {
        // Discard buffered bytes instead of letting drop flush them.
        if let Some(writer) = self.writer.take() {
            let (_file, _unflushed) = writer.into_parts();
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove abandoned file");
                Err(e.into())
            }
        }
    }
}
