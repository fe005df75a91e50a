//! Crash-consistent replacement of small on-disk records.
//!
//! A record is first written in full to a temporary sibling file and fsynced
//! (staged), then renamed over the live path and the parent directory is
//! fsynced (committed). Readers therefore observe either the complete old
//! record or the complete new one.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StorageResult;

const TMP_SUFFIX: &str = ".tmp";

/// A fully written and fsynced record waiting to be renamed into place.
///
/// Dropping a staged file without committing it removes the temporary file.
#[derive(Debug)]
pub struct StagedFile {
    tmp_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Writes `contents` next to `final_path` and fsyncs it.
    pub fn stage(final_path: &Path, contents: &[u8]) -> StorageResult<Self> {
        let mut name = final_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!("{}.{}", TMP_SUFFIX, uuid::Uuid::new_v4().simple()));
        let tmp_path = final_path.with_file_name(name);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        let staged = Self {
            tmp_path,
            final_path: final_path.to_path_buf(),
            committed: false,
        };
        file.write_all(contents)?;
        file.sync_all()?;
        debug!(path = %staged.final_path.display(), bytes = contents.len(), "staged record");
        Ok(staged)
    }

    /// The path this record replaces on commit.
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Atomically renames the staged record over the live path.
    pub fn commit(mut self) -> StorageResult<()> {
        std::fs::rename(&self.tmp_path, &self.final_path)?;
        self.committed = true;
        if let Some(parent) = self.final_path.parent() {
            sync_dir(parent)?;
        }
        debug!(path = %self.final_path.display(), "committed record");
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.tmp_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.tmp_path.display(), error = %e, "failed to remove staged file");
            }
        }
    }
}

/// Stages and immediately commits `contents` at `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> StorageResult<()> {
    StagedFile::stage(path, contents)?.commit()
}

/// fsyncs a directory so that renames and new entries inside it are durable.
pub fn sync_dir(dir: &Path) -> StorageResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}
