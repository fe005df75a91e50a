//! Write-ahead log segment files.
//!
//! Segments live in a tablet's WAL directory and are named by their sequence
//! number, zero padded so that lexical and numeric order agree.

use std::path::Path;

use crate::error::StorageResult;
use crate::sink::{DurableFile, WritableSink, WriteOptions};

/// File name prefix shared by all WAL segments.
pub const WAL_SEGMENT_PREFIX: &str = "wal-";

/// Returns the file name of the segment with sequence number `seqno`.
pub fn segment_file_name(seqno: u64) -> String {
    format!("{}{:09}", WAL_SEGMENT_PREFIX, seqno)
}

/// Parses a segment file name back into its sequence number.
pub fn parse_segment_file_name(name: &str) -> Option<u64> {
    name.strip_prefix(WAL_SEGMENT_PREFIX)?.parse().ok()
}

/// Sequence numbers of all segments present in `wal_dir`, ascending.
pub fn list_segments(wal_dir: &Path) -> StorageResult<Vec<u64>> {
    let mut seqnos = Vec::new();
    for entry in std::fs::read_dir(wal_dir)? {
        let entry = entry?;
        if let Some(seqno) = entry.file_name().to_str().and_then(parse_segment_file_name) {
            seqnos.push(seqno);
        }
    }
    seqnos.sort_unstable();
    Ok(seqnos)
}

/// A WAL segment being written from scratch.
#[derive(Debug)]
pub struct WalSegmentFile {
    seqno: u64,
    file: DurableFile,
}

impl WalSegmentFile {
    /// Creates segment `seqno` in `wal_dir`; the directory must already exist.
    pub fn create(wal_dir: &Path, seqno: u64, options: WriteOptions) -> StorageResult<Self> {
        let file = DurableFile::create_new(&wal_dir.join(segment_file_name(seqno)), options)?;
        Ok(Self { seqno, file })
    }

    /// Sequence number of this segment.
    pub fn seqno(&self) -> u64 {
        self.seqno
    }
}

impl WritableSink for WalSegmentFile {
    fn append(&mut self, data: &[u8]) -> StorageResult<()> {
        self.file.append(data)
    }

    fn bytes_appended(&self) -> u64 {
        self.file.written()
    }

    fn close(&mut self) -> StorageResult<()> {
        self.file.close()
    }

    fn abandon(&mut self) -> StorageResult<()> {
        self.file.abandon()
    }

    fn describe(&self) -> String {
        format!("WAL segment {} ({})", self.seqno, self.file.path().display())
    }
}
