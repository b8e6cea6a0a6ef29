//! Hybrid log allocator
//!
//! Records are reserved at the tail under a short mutex and never move.
//! Pages are zeroed on allocation and kept until the log is dropped, so a
//! [`RecordRef`] stays valid for as long as the log is borrowed.

use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use parking_lot::{Mutex, RwLock};

use crate::address::{Address, AtomicAddress};
use crate::record::{record_size, RecordInfo, RecordRef, VALUE_OFFSET};
use crate::status::Status;
use crate::utility::AlignedBuffer;
use crate::value::Value;

/// Alignment of every page buffer.
const PAGE_ALIGNMENT: usize = 64;

/// Smallest page size accepted, in bits.
const MIN_PAGE_BITS: u32 = 12;

/// Default page size, in bits (4 MB pages).
pub const DEFAULT_PAGE_BITS: u32 = 22;

/// Configuration for the hybrid log allocator
#[derive(Debug, Clone)]
pub struct HybridLogConfig {
    /// Bytes of log kept in memory above `head_address`
    pub memory_size: u64,
    /// Page size in bits; clamped so a page never exceeds `memory_size`
    pub page_size_bits: u32,
    /// Fraction of `memory_size` that forms the mutable region
    pub mutable_fraction: f64,
}

impl HybridLogConfig {
    /// Create a new configuration
    pub fn new(memory_size: u64, page_size_bits: u32) -> Self {
        Self {
            memory_size,
            page_size_bits,
            mutable_fraction: 0.9,
        }
    }

    /// Effective page size in bits.
    pub fn effective_page_bits(&self) -> u32 {
        let memory_bits = 63 - self.memory_size.max(1).leading_zeros();
        self.page_size_bits.min(memory_bits).max(MIN_PAGE_BITS)
    }

    /// Size of the mutable region in bytes.
    pub fn mutable_bytes(&self) -> u64 {
        let fraction = self.mutable_fraction.clamp(0.0, 1.0);
        (self.memory_size as f64 * fraction) as u64
    }
}

impl Default for HybridLogConfig {
    fn default() -> Self {
        Self::new(1 << 30, DEFAULT_PAGE_BITS)
    }
}

/// Snapshot of the log boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogStats {
    /// Oldest address still reachable
    pub begin_address: Address,
    /// Start of the in-memory region
    pub head_address: Address,
    /// Start of the mutable region
    pub read_only_address: Address,
    /// Next address to allocate
    pub tail_address: Address,
    /// Pages allocated so far
    pub pages: usize,
}

/// The hybrid log.
pub struct HybridLog {
    config: HybridLogConfig,
    page_bits: u32,
    mutable_bytes: u64,
    pages: RwLock<Vec<AlignedBuffer>>,
    /// Allocation cursor. The published tail below trails it.
    cursor: Mutex<Address>,
    tail_address: AtomicAddress,
    read_only_address: AtomicAddress,
    head_address: AtomicAddress,
    begin_address: AtomicAddress,
}

impl HybridLog {
    /// Create an empty log.
    pub fn new(config: HybridLogConfig) -> Self {
        let page_bits = config.effective_page_bits();
        let mutable_bytes = config.mutable_bytes();
        Self {
            config,
            page_bits,
            mutable_bytes,
            pages: RwLock::new(Vec::new()),
            cursor: Mutex::new(Address::FIRST_VALID),
            tail_address: AtomicAddress::new(Address::FIRST_VALID),
            read_only_address: AtomicAddress::new(Address::FIRST_VALID),
            head_address: AtomicAddress::new(Address::FIRST_VALID),
            begin_address: AtomicAddress::new(Address::FIRST_VALID),
        }
    }

    /// Allocator configuration.
    pub fn config(&self) -> &HybridLogConfig {
        &self.config
    }

    /// Page size in bytes.
    #[inline]
    pub fn page_size(&self) -> u64 {
        1 << self.page_bits
    }

    /// Next address to allocate.
    #[inline]
    pub fn tail_address(&self) -> Address {
        self.tail_address.load(Ordering::Acquire)
    }

    /// Records at or above this address may be updated in place.
    #[inline]
    pub fn read_only_address(&self) -> Address {
        self.read_only_address.load(Ordering::Acquire)
    }

    /// Records below this address are cold.
    #[inline]
    pub fn head_address(&self) -> Address {
        self.head_address.load(Ordering::Acquire)
    }

    /// Records below this address are unreachable.
    #[inline]
    pub fn begin_address(&self) -> Address {
        self.begin_address.load(Ordering::Acquire)
    }

    /// Reserve and format a record with a `value_size`-byte value slot.
    ///
    /// The record header is marked invalid with no predecessor; the caller
    /// fills in the key and value, then publishes the header.
    pub fn allocate(&self, value_size: usize) -> Result<(Address, RecordRef<'_>), Status> {
        let size = record_size(value_size) as u64;
        if size > self.page_size() {
            return Err(Status::OutOfMemory);
        }

        let (address, new_tail, record) = {
            let mut cursor = self.cursor.lock();
            let mut address = *cursor;
            if address.offset(self.page_bits) + size > self.page_size() {
                address = Address::from_control((address.page(self.page_bits) + 1) << self.page_bits);
            }
            if address.control() + size > Address::MAX_ADDRESS {
                return Err(Status::OutOfMemory);
            }
            self.ensure_page(address.page(self.page_bits))?;
            let ptr = self.record_ptr(address).ok_or(Status::OutOfMemory)?;

            // SAFETY: the reserved bytes are zeroed, in bounds, and not yet
            // reachable by any other thread.
            let record = unsafe {
                let record = RecordRef::from_ptr(ptr);
                record
                    .info()
                    .store(RecordInfo::pack(Address::INVALID, true, false));
                Value::format(NonNull::new_unchecked(ptr.as_ptr().add(VALUE_OFFSET)), value_size);
                record
            };

            let new_tail = address + size;
            *cursor = new_tail;
            self.tail_address.store(new_tail, Ordering::Release);
            (address, new_tail, record)
        };

        self.shift_boundaries(new_tail);
        Ok((address, record))
    }

    fn ensure_page(&self, page: u64) -> Result<(), Status> {
        let page = page as usize;
        if self.pages.read().len() > page {
            return Ok(());
        }
        let mut pages = self.pages.write();
        while pages.len() <= page {
            let buffer = AlignedBuffer::zeroed(PAGE_ALIGNMENT, self.page_size() as usize)
                .ok_or(Status::OutOfMemory)?;
            pages.push(buffer);
        }
        Ok(())
    }

    fn record_ptr(&self, address: Address) -> Option<NonNull<u8>> {
        let pages = self.pages.read();
        let page = pages.get(address.page(self.page_bits) as usize)?;
        let offset = address.offset(self.page_bits) as usize;
        // SAFETY: offset < page size.
        Some(unsafe { NonNull::new_unchecked(page.raw().as_ptr().add(offset)) })
    }

    /// Look up the record at `address`.
    ///
    /// Returns `None` for addresses outside `[begin, tail)`.
    pub fn get(&self, address: Address) -> Option<RecordRef<'_>> {
        if address < self.begin_address() || address >= self.tail_address() {
            return None;
        }
        let ptr = self.record_ptr(address)?;
        // SAFETY: pages are never freed while `self` is borrowed.
        Some(unsafe { RecordRef::from_ptr(ptr) })
    }

    fn shift_boundaries(&self, tail: Address) {
        if let Some(read_only) = tail.control().checked_sub(self.mutable_bytes) {
            self.read_only_address
                .fetch_max(Address::from_control(read_only), Ordering::AcqRel);
        }
        if let Some(head) = tail.control().checked_sub(self.config.memory_size) {
            self.head_address
                .fetch_max(Address::from_control(head), Ordering::AcqRel);
        }
    }

    /// Move the read-only boundary forward, at most to the tail.
    pub fn shift_read_only_address(&self, address: Address) {
        let address = address.min(self.tail_address());
        self.read_only_address.fetch_max(address, Ordering::AcqRel);
    }

    /// Move the head boundary forward, at most to the read-only boundary.
    pub fn shift_head_address(&self, address: Address) {
        self.shift_read_only_address(address);
        let address = address.min(self.read_only_address());
        self.head_address.fetch_max(address, Ordering::AcqRel);
    }

    /// Move the begin boundary forward, at most to the read-only boundary.
    pub fn shift_begin_address(&self, address: Address) {
        let address = address.min(self.read_only_address());
        self.begin_address.fetch_max(address, Ordering::AcqRel);
    }

    /// Iterate over the records in `[from, until)`, skipping page filler.
    pub fn scan(&self, from: Address, until: Address) -> LogScanner<'_> {
        LogScanner {
            log: self,
            current: from.max(self.begin_address()),
            until: until.min(self.tail_address()),
        }
    }

    /// Snapshot of the log boundaries.
    pub fn stats(&self) -> LogStats {
        LogStats {
            begin_address: self.begin_address(),
            head_address: self.head_address(),
            read_only_address: self.read_only_address(),
            tail_address: self.tail_address(),
            pages: self.pages.read().len(),
        }
    }
}

/// Iterator over the records of a log range.
pub struct LogScanner<'a> {
    log: &'a HybridLog,
    current: Address,
    until: Address,
}

impl<'a> Iterator for LogScanner<'a> {
    type Item = (Address, RecordRef<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let page_bits = self.log.page_bits;
        while self.current < self.until {
            let address = self.current;
            let record = self.log.get(address)?;
            if record.info().is_null() {
                self.current = Address::from_control((address.page(page_bits) + 1) << page_bits);
                continue;
            }
            self.current = address + record.size() as u64;
            return Some((address, record));
        }
        None
    }
}
