//! Record header and key for the hybrid log.
//!
//! Every record in the log is laid out as:
//!
//! ```text
//! +--------------+----------+---------------------------+
//! | RecordInfo 8 | Key 8    | value slot (header + data)|
//! +--------------+----------+---------------------------+
//! ```
//!
//! padded to an 8-byte boundary. The value slot is described in
//! [`crate::value`].

use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::address::Address;
use crate::utility::{hash64, pad_alignment};
use crate::value::Value;

/// Record header.
///
/// The header is 8 bytes and contains:
/// - Previous address (48 bits): Points to the previous record in the hash chain
/// - Invalid bit (1 bit): The record was never published, or was withdrawn
/// - Tombstone bit (1 bit): Whether this is a delete marker
///
/// A zero header marks unused page space, since a live header always carries
/// at least [`Address::INVALID`] as its previous address.
#[repr(C)]
pub struct RecordInfo {
    control: AtomicU64,
}

impl RecordInfo {
    /// Mask for the previous address (48 bits)
    const PREV_ADDR_MASK: u64 = (1 << 48) - 1;

    /// Bit position for invalid flag
    const INVALID_BIT: u64 = 1 << 61;
    /// Bit position for tombstone flag
    const TOMBSTONE_BIT: u64 = 1 << 62;

    /// Pack a header value.
    pub const fn pack(previous_address: Address, invalid: bool, tombstone: bool) -> u64 {
        let mut control = previous_address.control() & Self::PREV_ADDR_MASK;
        if invalid {
            control |= Self::INVALID_BIT;
        }
        if tombstone {
            control |= Self::TOMBSTONE_BIT;
        }
        control
    }

    /// Check if the record info is null (all zeros).
    #[inline]
    pub fn is_null(&self) -> bool {
        self.control.load(Ordering::Acquire) == 0
    }

    /// Get the previous address in the hash chain.
    #[inline]
    pub fn previous_address(&self) -> Address {
        Address::from_control(self.control.load(Ordering::Acquire) & Self::PREV_ADDR_MASK)
    }

    /// Check if the record is invalid.
    #[inline]
    pub fn is_invalid(&self) -> bool {
        (self.control.load(Ordering::Acquire) & Self::INVALID_BIT) != 0
    }

    /// Mark the record invalid. Scans and chain walks skip it from then on.
    #[inline]
    pub fn set_invalid(&self) {
        self.control.fetch_or(Self::INVALID_BIT, Ordering::AcqRel);
    }

    /// Check if this is a tombstone (delete marker).
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        (self.control.load(Ordering::Acquire) & Self::TOMBSTONE_BIT) != 0
    }

    /// Get the raw control value.
    #[inline]
    pub fn control(&self) -> u64 {
        self.control.load(Ordering::Acquire)
    }

    /// Overwrite the header. Only valid before the record is published.
    #[inline]
    pub fn store(&self, value: u64) {
        self.control.store(value, Ordering::Release);
    }
}

impl fmt::Debug for RecordInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordInfo")
            .field("previous_address", &self.previous_address())
            .field("invalid", &self.is_invalid())
            .field("tombstone", &self.is_tombstone())
            .finish()
    }
}

/// An 8-byte key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct Key(pub u64);

impl Key {
    /// Stable 64-bit hash of the key's little-endian bytes.
    #[inline]
    pub fn hash(&self) -> u64 {
        hash64(&self.0.to_le_bytes())
    }
}

impl From<u64> for Key {
    fn from(key: u64) -> Self {
        Key(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Offset of the key within a record.
pub const KEY_OFFSET: usize = 8;

/// Offset of the value slot within a record.
pub const VALUE_OFFSET: usize = 16;

/// Total bytes a record with a `value_size`-byte value slot occupies.
#[inline]
pub const fn record_size(value_size: usize) -> usize {
    pad_alignment(VALUE_OFFSET + value_size, 8)
}

/// A view over one record in log memory.
///
/// The view does not own the memory; the allocator keeps pages alive for
/// the lifetime of the store.
#[derive(Clone, Copy)]
pub struct RecordRef<'a> {
    ptr: NonNull<u8>,
    _log: std::marker::PhantomData<&'a ()>,
}

impl<'a> RecordRef<'a> {
    /// Wrap a record pointer.
    ///
    /// # Safety
    /// `ptr` must be 8-aligned and point at a record whose bytes stay valid
    /// for `'a`.
    #[inline]
    pub unsafe fn from_ptr(ptr: NonNull<u8>) -> Self {
        Self {
            ptr,
            _log: std::marker::PhantomData,
        }
    }

    /// The record header.
    #[inline]
    pub fn info(&self) -> &'a RecordInfo {
        // SAFETY: the header is the first 8 bytes and aligned.
        unsafe { &*(self.ptr.as_ptr() as *const RecordInfo) }
    }

    /// The record key.
    #[inline]
    pub fn key(&self) -> Key {
        // SAFETY: the key is written before the record is published and is
        // never modified afterwards.
        Key(unsafe { std::ptr::read(self.ptr.as_ptr().add(KEY_OFFSET) as *const u64) })
    }

    /// Write the key. Only valid before the record is published.
    ///
    /// # Safety
    /// The caller must have exclusive access to the record.
    #[inline]
    pub unsafe fn set_key(&self, key: Key) {
        std::ptr::write(self.ptr.as_ptr().add(KEY_OFFSET) as *mut u64, key.0);
    }

    /// The value slot.
    #[inline]
    pub fn value(&self) -> Value<'a> {
        // SAFETY: every record reserved by the allocator carries a value slot
        // whose header was written at allocation.
        unsafe { Value::from_slot(NonNull::new_unchecked(self.ptr.as_ptr().add(VALUE_OFFSET))) }
    }

    /// Total bytes this record occupies.
    #[inline]
    pub fn size(&self) -> usize {
        record_size(self.value().size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_info_pack() {
        let addr = Address::from_control(4096);
        let info = RecordInfo {
            control: AtomicU64::new(RecordInfo::pack(addr, false, true)),
        };
        assert_eq!(info.previous_address(), addr);
        assert!(!info.is_invalid());
        assert!(info.is_tombstone());
        assert!(!info.is_null());

        info.set_invalid();
        assert!(info.is_invalid());
        assert_eq!(info.previous_address(), addr);
    }

    #[test]
    fn test_invalid_chain_end_is_not_null() {
        assert_ne!(RecordInfo::pack(Address::INVALID, false, false), 0);
    }

    #[test]
    fn test_record_size() {
        assert_eq!(record_size(24), 40);
        assert_eq!(record_size(25), 48);
        assert_eq!(record_size(32), 48);
    }

    #[test]
    fn test_key_hash_is_deterministic() {
        assert_eq!(Key(7).hash(), Key(7).hash());
        assert_ne!(Key(7).hash(), Key(8).hash());
    }
}
