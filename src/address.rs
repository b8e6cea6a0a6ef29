//! Address types for the hybrid log
//!
//! An address is a linear 48-bit byte offset into the logical log. The page
//! holding an address is `address >> page_bits`, where `page_bits` is chosen
//! by the allocator at construction time.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// A logical address into the hybrid log.
#[repr(transparent)]
#[derive(Clone, Copy, Default, Hash)]
pub struct Address(u64);

impl Address {
    /// An invalid address, used to terminate hash chains.
    ///
    /// Note: set to 1, not 0, so that a zeroed record header never looks
    /// like a link to a real record.
    pub const INVALID: Self = Self(1);

    /// The first address handed out by the allocator. Offsets below it are
    /// reserved so that no record lives at address 0 or 1.
    pub const FIRST_VALID: Self = Self(64);

    /// Total number of address bits used
    pub const ADDRESS_BITS: u32 = 48;

    /// Maximum valid address value
    pub const MAX_ADDRESS: u64 = (1 << Self::ADDRESS_BITS) - 1;

    /// Create an address from a raw control value
    #[inline]
    pub const fn from_control(control: u64) -> Self {
        Self(control & Self::MAX_ADDRESS)
    }

    /// Get the raw control value
    #[inline]
    pub const fn control(&self) -> u64 {
        self.0
    }

    /// Page number for a log with `2^page_bits` byte pages
    #[inline]
    pub const fn page(&self, page_bits: u32) -> u64 {
        self.0 >> page_bits
    }

    /// Offset within the page for a log with `2^page_bits` byte pages
    #[inline]
    pub const fn offset(&self, page_bits: u32) -> u64 {
        self.0 & ((1 << page_bits) - 1)
    }

    /// Check if this is an invalid address
    #[inline]
    pub const fn is_invalid(&self) -> bool {
        self.0 == Self::INVALID.0
    }

    /// Check if this is a valid address (not invalid)
    #[inline]
    pub const fn is_valid(&self) -> bool {
        !self.is_invalid()
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "Address(INVALID)")
        } else {
            write!(f, "Address({:#x})", self.0)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl PartialEq for Address {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Address {}

impl PartialOrd for Address {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Add<u64> for Address {
    type Output = Self;

    #[inline]
    fn add(self, delta: u64) -> Self::Output {
        debug_assert!(self.0 + delta <= Self::MAX_ADDRESS);
        Self(self.0 + delta)
    }
}

impl Sub for Address {
    type Output = u64;

    #[inline]
    fn sub(self, other: Self) -> Self::Output {
        self.0 - other.0
    }
}

impl From<u64> for Address {
    #[inline]
    fn from(control: u64) -> Self {
        Self::from_control(control)
    }
}

impl From<Address> for u64 {
    #[inline]
    fn from(addr: Address) -> Self {
        addr.0
    }
}

/// Atomic version of Address for thread-safe operations
#[repr(transparent)]
pub struct AtomicAddress {
    control: AtomicU64,
}

impl AtomicAddress {
    /// Create a new atomic address
    #[inline]
    pub const fn new(address: Address) -> Self {
        Self {
            control: AtomicU64::new(address.0),
        }
    }

    /// Load the address atomically
    #[inline]
    pub fn load(&self, ordering: AtomicOrdering) -> Address {
        Address(self.control.load(ordering))
    }

    /// Store an address atomically
    #[inline]
    pub fn store(&self, address: Address, ordering: AtomicOrdering) {
        self.control.store(address.0, ordering);
    }

    /// Compare and exchange the address atomically
    #[inline]
    pub fn compare_exchange(
        &self,
        current: Address,
        new: Address,
        success: AtomicOrdering,
        failure: AtomicOrdering,
    ) -> Result<Address, Address> {
        self.control
            .compare_exchange(current.0, new.0, success, failure)
            .map(Address)
            .map_err(Address)
    }

    /// Raise the address to at least `address`, returning the previous value.
    ///
    /// Log boundaries only ever move forward.
    #[inline]
    pub fn fetch_max(&self, address: Address, ordering: AtomicOrdering) -> Address {
        Address(self.control.fetch_max(address.0, ordering))
    }
}

impl Default for AtomicAddress {
    fn default() -> Self {
        Self::new(Address::INVALID)
    }
}

impl fmt::Debug for AtomicAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = self.load(AtomicOrdering::Relaxed);
        f.debug_struct("AtomicAddress")
            .field("address", &addr)
            .finish()
    }
}
