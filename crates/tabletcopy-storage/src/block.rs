//! Core block types for the storage subsystem.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique identifier for a data block managed by the local block manager.
///
/// Identifiers are only meaningful on the node that allocated them; a block
/// copied from another node is always given a fresh local identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(u64);

impl BlockId {
    /// Creates a new BlockId from its raw value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value of this block ID.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// File name used for this block inside the block directory.
    pub fn file_name(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for BlockId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(BlockId)
    }
}
