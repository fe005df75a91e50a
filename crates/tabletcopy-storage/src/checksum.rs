//! Checksum module for data integrity verification.
//!
//! Provides CRC32 and xxHash64 algorithms. Every chunk streamed from a remote
//! peer carries one of these, and superblocks/consensus records persisted
//! locally are sealed with CRC32.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Supported checksum algorithms for data integrity verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ChecksumAlgorithm {
    /// CRC32 (IEEE), SIMD-accelerated through `crc32fast`
    #[default]
    Crc32,
    /// xxHash64, a fast non-cryptographic hash for large payloads
    XxHash64,
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumAlgorithm::Crc32 => write!(f, "CRC32"),
            ChecksumAlgorithm::XxHash64 => write!(f, "xxHash64"),
        }
    }
}

/// A computed checksum value with its algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum {
    /// The algorithm used to compute this checksum.
    pub algorithm: ChecksumAlgorithm,
    /// The checksum value.
    pub value: u64,
}

impl Checksum {
    /// Creates a new checksum with the given algorithm and value.
    pub fn new(algorithm: ChecksumAlgorithm, value: u64) -> Self {
        Self { algorithm, value }
    }
}

/// Computes the checksum for the given data using the specified algorithm.
pub fn compute(algorithm: ChecksumAlgorithm, data: &[u8]) -> Checksum {
    let value = match algorithm {
        ChecksumAlgorithm::Crc32 => crc32fast::hash(data) as u64,
        ChecksumAlgorithm::XxHash64 => xxhash_rust::xxh64::xxh64(data, 0),
    };
    Checksum { algorithm, value }
}

/// Verifies that the data matches the given checksum.
///
/// Returns `true` if the computed checksum matches the expected value.
pub fn verify(checksum: &Checksum, data: &[u8]) -> bool {
    let computed = compute(checksum.algorithm, data);
    let matches = computed.value == checksum.value;
    if !matches {
        debug!(
            algorithm = %checksum.algorithm,
            expected = checksum.value,
            actual = computed.value,
            size = data.len(),
            "checksum mismatch"
        );
    }
    matches
}

/// CRC32 of a byte slice, used to seal records written to local disk.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
