//! Bucket array of record chain heads.

use std::sync::atomic::Ordering;

use crate::address::{Address, AtomicAddress};
use crate::index::{IndexConfig, KeyHash};
use crate::utility::next_power_of_two;

/// Fixed-size hash index.
///
/// Each bucket holds the address of the newest record whose key hashes to
/// it; older records are reached through each record's previous address.
/// Keys that collide on a bucket share one chain.
pub struct HashIndex {
    buckets: Box<[AtomicAddress]>,
    size: u64,
}

/// Occupancy figures for the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Number of buckets
    pub table_size: u64,
    /// Buckets with at least one record
    pub used_buckets: u64,
}

impl HashIndex {
    /// Create an empty index.
    pub fn new(config: &IndexConfig) -> Self {
        let size = next_power_of_two(config.table_size.max(1));
        let buckets = (0..size)
            .map(|_| AtomicAddress::new(Address::INVALID))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { buckets, size }
    }

    /// Number of buckets.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    fn bucket(&self, hash: KeyHash) -> &AtomicAddress {
        &self.buckets[hash.hash_table_index(self.size)]
    }

    /// Newest record address in the hash's chain, or `Address::INVALID`.
    #[inline]
    pub fn head(&self, hash: KeyHash) -> Address {
        self.bucket(hash).load(Ordering::Acquire)
    }

    /// Swing the chain head from `expected` to `new`.
    ///
    /// Returns the current head on failure so the caller can retry.
    #[inline]
    pub fn try_update(&self, hash: KeyHash, expected: Address, new: Address) -> Result<(), Address> {
        self.bucket(hash)
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
    }

    /// Chain heads of every non-empty bucket.
    pub fn heads(&self) -> impl Iterator<Item = Address> + '_ {
        self.buckets
            .iter()
            .map(|b| b.load(Ordering::Acquire))
            .filter(Address::is_valid)
    }

    /// Reset every bucket to empty.
    pub fn clear(&self) {
        for bucket in self.buckets.iter() {
            bucket.store(Address::INVALID, Ordering::Release);
        }
    }

    /// Occupancy snapshot.
    pub fn stats(&self) -> IndexStats {
        let used_buckets = self
            .buckets
            .iter()
            .filter(|b| b.load(Ordering::Relaxed).is_valid())
            .count() as u64;
        IndexStats {
            table_size: self.size,
            used_buckets,
        }
    }
}
