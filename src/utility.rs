//! Utility functions
//!
//! Alignment helpers, the aligned page buffer used by the hybrid log, and
//! the stable key hash.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

#[cfg(not(any(feature = "hash-xxh3", feature = "hash-xxh64")))]
compile_error!("Enable a hash feature: `hash-xxh3` (default) or `hash-xxh64`.");

/// Check if a value is a power of two
#[inline]
pub const fn is_power_of_two(n: u64) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Round up to the next power of two
#[inline]
pub const fn next_power_of_two(mut n: u64) -> u64 {
    if n == 0 {
        return 1;
    }
    n -= 1;
    n |= n >> 1;
    n |= n >> 2;
    n |= n >> 4;
    n |= n >> 8;
    n |= n >> 16;
    n |= n >> 32;
    n + 1
}

/// Pad a size to the specified alignment
#[inline]
pub const fn pad_alignment(size: usize, alignment: usize) -> usize {
    debug_assert!(is_power_of_two(alignment as u64));
    (size + alignment - 1) & !(alignment - 1)
}

/// Hash bytes into a 64-bit value.
///
/// Deterministic across runs and processes, so hash-derived bucket
/// positions stay meaningful after recovery.
#[inline]
pub fn hash64(bytes: &[u8]) -> u64 {
    #[cfg(feature = "hash-xxh3")]
    {
        xxhash_rust::xxh3::xxh3_64(bytes)
    }

    #[cfg(all(not(feature = "hash-xxh3"), feature = "hash-xxh64"))]
    {
        xxhash_rust::xxh64::xxh64(bytes, 0)
    }
}

/// RAII wrapper for zeroed, aligned memory
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedBuffer {
    /// Allocate a new zeroed aligned buffer.
    ///
    /// Returns `None` for a zero size, a non power-of-two alignment, or when
    /// the allocator is out of memory.
    pub fn zeroed(alignment: usize, size: usize) -> Option<Self> {
        if size == 0 {
            return None;
        }
        let layout = Layout::from_size_align(size, alignment).ok()?;
        // SAFETY: layout has a non-zero size.
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) })?;
        Some(Self { ptr, layout })
    }

    /// Raw pointer usable for interior-mutable access through atomics.
    ///
    /// Callers are responsible for coordinating access to the bytes.
    pub fn raw(&self) -> NonNull<u8> {
        self.ptr
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated with exactly this layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// Safety: AlignedBuffer owns its memory. Concurrent access to the bytes is
// coordinated by the record control words that live inside it.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_power_of_two() {
        assert!(!is_power_of_two(0));
        assert!(is_power_of_two(1));
        assert!(!is_power_of_two(3));
        assert!(is_power_of_two(1024));
        assert!(!is_power_of_two(1023));
    }

    #[test]
    fn test_next_power_of_two() {
        assert_eq!(next_power_of_two(0), 1);
        assert_eq!(next_power_of_two(1), 1);
        assert_eq!(next_power_of_two(3), 4);
        assert_eq!(next_power_of_two(1000), 1024);
    }

    #[test]
    fn test_pad_alignment() {
        assert_eq!(pad_alignment(1, 8), 8);
        assert_eq!(pad_alignment(8, 8), 8);
        assert_eq!(pad_alignment(9, 8), 16);
        assert_eq!(pad_alignment(100, 64), 128);
    }

    #[test]
    fn test_hash64_is_stable() {
        assert_eq!(hash64(b"key"), hash64(b"key"));
        assert_ne!(hash64(&1u64.to_le_bytes()), hash64(&2u64.to_le_bytes()));
    }

    #[test]
    fn test_aligned_buffer() {
        let buf = AlignedBuffer::zeroed(64, 1024).unwrap();
        assert_eq!(buf.layout.size(), 1024);
        assert_eq!(buf.raw().as_ptr() as usize % 64, 0);
        assert!(AlignedBuffer::zeroed(64, 0).is_none());
        assert!(AlignedBuffer::zeroed(3, 64).is_none());
    }
}
