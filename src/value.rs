//! Value slots with an inline generation lock.
//!
//! A value slot lives inside a log record and is laid out as:
//!
//! ```text
//! +-------------+---------+-----------+----------------------------+
//! | GenLock (8) | size(8) | length(8) | payload (size - 24 bytes)  |
//! +-------------+---------+-----------+----------------------------+
//! ```
//!
//! `size` is the full slot size including the header and never changes after
//! allocation. `length` is the number of payload bytes in use. Writers
//! mutate a slot in place only while holding its [`AtomicGenLock`]; readers
//! copy it out optimistically and validate against the generation.

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::thread;

use crate::gen_lock::{AtomicGenLock, GenLock, LockOutcome};

/// Fixed header at the start of every value slot.
#[repr(C)]
pub struct ValueHeader {
    gen_lock: AtomicGenLock,
    size: AtomicU64,
    length: AtomicU64,
}

/// Size of [`ValueHeader`] in bytes.
pub const VALUE_HEADER_SIZE: usize = std::mem::size_of::<ValueHeader>();

const _: () = assert!(VALUE_HEADER_SIZE == 24);

/// A view over one value slot in log memory.
///
/// A shared `&Value` permits lock-protected in-place mutation and
/// optimistic reads. A `&mut Value` is only handed out for a freshly
/// allocated slot that no other thread can reach yet.
pub struct Value<'a> {
    header: &'a ValueHeader,
    payload: NonNull<u8>,
    _slot: PhantomData<&'a [u8]>,
}

// Safety: all shared access to the payload is coordinated by the lock word.
unsafe impl Send for Value<'_> {}
unsafe impl Sync for Value<'_> {}

impl<'a> Value<'a> {
    /// Wrap an existing slot.
    ///
    /// # Safety
    /// `slot` must be 8-aligned and point at a formatted value slot that
    /// stays valid for `'a`.
    #[inline]
    pub unsafe fn from_slot(slot: NonNull<u8>) -> Self {
        Self {
            header: &*(slot.as_ptr() as *const ValueHeader),
            payload: NonNull::new_unchecked(slot.as_ptr().add(VALUE_HEADER_SIZE)),
            _slot: PhantomData,
        }
    }

    /// Format zeroed memory as an empty slot of `value_size` bytes.
    ///
    /// # Safety
    /// `slot` must be 8-aligned, point at `value_size` writable bytes that
    /// stay valid for `'a`, and must not be reachable by any other thread.
    pub unsafe fn format(slot: NonNull<u8>, value_size: usize) -> Self {
        debug_assert!(value_size >= VALUE_HEADER_SIZE);
        let value = Self::from_slot(slot);
        value.header.gen_lock.store(GenLock::default());
        value.header.size.store(value_size as u64, Ordering::Relaxed);
        value.header.length.store(0, Ordering::Relaxed);
        value
    }

    /// Full slot size, header included.
    #[inline]
    pub fn size(&self) -> usize {
        self.header.size.load(Ordering::Acquire) as usize
    }

    /// Payload bytes available in this slot.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.size().saturating_sub(VALUE_HEADER_SIZE)
    }

    /// Payload bytes currently in use.
    #[inline]
    pub fn length(&self) -> usize {
        (self.header.length.load(Ordering::Acquire) as usize).min(self.capacity())
    }

    /// The slot's lock word.
    #[inline]
    pub fn gen_lock(&self) -> &'a AtomicGenLock {
        &self.header.gen_lock
    }

    /// Current staleness counter.
    #[inline]
    pub fn staleness(&self) -> i32 {
        self.header.gen_lock.load().staleness()
    }

    /// Whether a `len`-byte payload fits in this slot.
    #[inline]
    pub fn fits(&self, len: usize) -> bool {
        len <= self.capacity()
    }

    /// Copy the payload without the read protocol.
    ///
    /// Only sound for slots no writer can lock any more.
    pub fn copy_to(&self, out: &mut Vec<u8>) {
        let len = self.length();
        out.clear();
        out.reserve(len);
        // SAFETY: len <= capacity, and `out` has room for len bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(self.payload.as_ptr(), out.as_mut_ptr(), len);
            out.set_len(len);
        }
    }

    /// Copy the payload consistently while writers may hold the lock.
    ///
    /// Retries until a copy is bracketed by two samples of the lock word
    /// with the same generation and no writer in between. Returns the lock
    /// word observed before the successful copy.
    pub fn copy_atomic_to(&self, out: &mut Vec<u8>) -> GenLock {
        loop {
            let before = self.header.gen_lock.load();
            if before.is_locked() {
                thread::yield_now();
                continue;
            }
            self.copy_to(out);
            fence(Ordering::Acquire);
            let after = self.header.gen_lock.load();
            if !after.is_locked() && after.generation() == before.generation() {
                return before;
            }
        }
    }

    /// Take the lock, spinning through contention.
    ///
    /// Fails with [`LockOutcome::BoundExceeded`] or
    /// [`LockOutcome::Replaced`]; the caller must then fall back to the
    /// engine's relocation path.
    pub fn lock(&self, staleness_incr: i32, staleness_bound: i32) -> Result<ValueGuard<'a>, LockOutcome> {
        match self.header.gen_lock.lock_spin(staleness_incr, staleness_bound) {
            LockOutcome::Acquired => Ok(ValueGuard {
                value: Value {
                    header: self.header,
                    payload: self.payload,
                    _slot: PhantomData,
                },
                staleness_incr,
                released: false,
            }),
            outcome => Err(outcome),
        }
    }

    /// Initialize a fresh slot: lock word, length and payload.
    ///
    /// # Panics
    /// If `payload` exceeds the slot capacity.
    pub fn init(&mut self, lock: GenLock, payload: &[u8]) {
        self.header.gen_lock.store(lock);
        self.write_payload(payload);
    }

    /// Overwrite the lock word of a fresh slot.
    pub fn set_lock(&mut self, lock: GenLock) {
        self.header.gen_lock.store(lock);
    }

    /// Mutable access to the whole payload capacity of a fresh slot.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        // SAFETY: exclusive access via &mut self on an unpublished slot.
        unsafe { std::slice::from_raw_parts_mut(self.payload.as_ptr(), self.capacity()) }
    }

    /// Set the payload length of a fresh slot.
    pub fn set_length(&mut self, len: usize) {
        assert!(len <= self.capacity(), "length {len} exceeds slot capacity {}", self.capacity());
        self.header.length.store(len as u64, Ordering::Release);
    }

    fn write_payload(&self, payload: &[u8]) {
        assert!(
            self.fits(payload.len()),
            "payload of {} bytes exceeds slot capacity {}",
            payload.len(),
            self.capacity()
        );
        // SAFETY: bounds checked above; callers hold exclusive access.
        unsafe {
            std::ptr::copy_nonoverlapping(payload.as_ptr(), self.payload.as_ptr(), payload.len());
        }
        self.header.length.store(payload.len() as u64, Ordering::Release);
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("gen_lock", &self.header.gen_lock.load())
            .field("size", &self.size())
            .field("length", &self.length())
            .finish()
    }
}

/// Exclusive in-place access to a locked value slot.
///
/// Dropping the guard unlocks normally. [`ValueGuard::abandon`] unlocks and
/// marks the slot replaced.
pub struct ValueGuard<'a> {
    value: Value<'a>,
    /// Increment applied when the lock was taken
    staleness_incr: i32,
    released: bool,
}

impl<'a> ValueGuard<'a> {
    /// Payload bytes currently in use.
    pub fn payload(&self) -> &[u8] {
        // SAFETY: the lock excludes other writers.
        unsafe { std::slice::from_raw_parts(self.value.payload.as_ptr(), self.value.length()) }
    }

    /// The whole payload capacity.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        self.value.payload_mut()
    }

    /// Whether a `len`-byte payload fits in this slot.
    pub fn fits(&self, len: usize) -> bool {
        self.value.fits(len)
    }

    /// Replace the payload and its length.
    pub fn write(&mut self, payload: &[u8]) {
        self.value.write_payload(payload);
    }

    /// Set the payload length.
    pub fn set_length(&mut self, len: usize) {
        self.value.set_length(len);
    }

    /// Current staleness counter (increment already applied).
    pub fn staleness(&self) -> i32 {
        self.value.staleness()
    }

    /// Unlock and mark the slot replaced. No later lock attempt succeeds.
    ///
    /// The staleness increment applied by the lock is taken back, so the
    /// record copied forward in its place sees the pre-lock counter. The
    /// copy hook applies the increment to the new record instead.
    pub fn abandon(mut self) {
        self.released = true;
        let gen_lock = &self.value.header.gen_lock;
        let word = gen_lock.load();
        gen_lock.store(word.with_staleness(word.staleness().wrapping_sub(self.staleness_incr)));
        gen_lock.unlock(true);
    }

    /// Unlock, publishing the update to readers.
    pub fn unlock(self) {}
}

impl Drop for ValueGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.value.header.gen_lock.unlock(false);
        }
    }
}

/// A heap-allocated value slot for exercising contexts outside the log.
#[cfg(test)]
pub(crate) struct TestSlot {
    buffer: crate::utility::AlignedBuffer,
}

#[cfg(test)]
impl TestSlot {
    pub(crate) fn new(value_size: usize) -> Self {
        let buffer = crate::utility::AlignedBuffer::zeroed(8, value_size).unwrap();
        // SAFETY: freshly allocated and exclusively owned.
        unsafe { Value::format(buffer.raw(), value_size) };
        Self { buffer }
    }

    pub(crate) fn with_payload(payload: &[u8], staleness: i32) -> Self {
        let slot = Self::new(VALUE_HEADER_SIZE + payload.len());
        slot.value()
            .init(GenLock::pack(staleness, 0, false, false), payload);
        slot
    }

    pub(crate) fn value(&self) -> Value<'_> {
        // SAFETY: formatted in `new` and kept alive by `self`.
        unsafe { Value::from_slot(self.buffer.raw()) }
    }
}
