//! Hash index
//!
//! This module provides the hash index used by the store to locate the most
//! recent record for a key in the hybrid log.

mod hash_table;

pub use hash_table::{HashIndex, IndexStats};

/// Key hash type for index operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyHash {
    hash: u64,
}

impl KeyHash {
    /// Create a new key hash
    #[inline]
    pub const fn new(hash: u64) -> Self {
        Self { hash }
    }

    /// Get the full hash value
    #[inline]
    pub const fn hash(&self) -> u64 {
        self.hash
    }

    /// Get the hash table index for a given table size
    #[inline]
    pub const fn hash_table_index(&self, size: u64) -> usize {
        (self.hash as usize) & ((size as usize) - 1)
    }
}

impl From<u64> for KeyHash {
    #[inline]
    fn from(hash: u64) -> Self {
        Self::new(hash)
    }
}

/// Configuration for the hash index
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Number of buckets (rounded up to a power of 2)
    pub table_size: u64,
}

impl IndexConfig {
    /// Create a new index configuration
    pub fn new(table_size: u64) -> Self {
        Self { table_size }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::new(1 << 16)
    }
}
