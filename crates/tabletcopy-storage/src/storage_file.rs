//! Storage-engine files copied verbatim under their original names.

use std::path::Path;

use crate::error::{StorageError, StorageResult};
use crate::sink::{DurableFile, WritableSink, WriteOptions};

/// Rejects names that would escape the target directory.
pub fn validate_file_name(name: &str) -> StorageResult<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(StorageError::InvalidFileName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// A storage-engine file being written into a tablet's data directory.
#[derive(Debug)]
pub struct StorageFileWriter {
    name: String,
    file: DurableFile,
}

impl StorageFileWriter {
    /// Creates `name` inside `dir`; the name must be a plain file name.
    pub fn create(dir: &Path, name: &str, options: WriteOptions) -> StorageResult<Self> {
        validate_file_name(name)?;
        let file = DurableFile::create_new(&dir.join(name), options)?;
        Ok(Self {
            name: name.to_string(),
            file,
        })
    }

    /// File name of this storage file.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl WritableSink for StorageFileWriter {
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
        format!("storage file {}", self.name)
    }
}
