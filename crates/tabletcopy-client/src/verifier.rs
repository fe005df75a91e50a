//! Per-chunk verification of downloaded data.

use tabletcopy_storage::checksum;

use crate::error::{CopyError, CopyResult};
use crate::messages::{DataChunk, DataId};

/// Checks a received chunk before any of its bytes are used.
///
/// The chunk must start at the offset that was requested, must not extend
/// past the declared length of the item, and its bytes must match the
/// checksum sent with them.
pub fn verify_chunk(data_id: &DataId, requested_offset: u64, chunk: &DataChunk) -> CopyResult<()> {
    if chunk.offset != requested_offset {
        return Err(CopyError::DataCorruption(format!(
            "{}: offset for returned chunk ({}) differs from requested offset ({})",
            data_id, chunk.offset, requested_offset
        )));
    }

    let end = chunk.offset.checked_add(chunk.data.len() as u64);
    match end {
        Some(end) if end <= chunk.total_data_length => {}
        _ => {
            return Err(CopyError::DataCorruption(format!(
                "{}: chunk at offset {} with {} bytes exceeds total length {}",
                data_id,
                chunk.offset,
                chunk.data.len(),
                chunk.total_data_length
            )))
        }
    }

    if !checksum::verify(&chunk.checksum, &chunk.data) {
        return Err(CopyError::DataCorruption(format!(
            "{}: {} checksum mismatch on chunk at offset {}",
            data_id, chunk.checksum.algorithm, chunk.offset
        )));
    }
    Ok(())
}
