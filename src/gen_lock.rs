//! Generation lock for in-place record mutation.
//!
//! Every value slot in the log starts with one 64-bit control word that packs
//! four fields:
//!
//! ```text
//!  63        62       61 ............ 32  31 ............ 0
//! [replaced][locked][ generation (30) ][ staleness (i32) ]
//! ```
//!
//! - `staleness`: signed drift counter. Each successful lock acquisition adds
//!   the caller's increment, and acquisitions that would push it above the
//!   caller's bound are refused.
//! - `generation`: bumped on every unlock. Readers sample it before and after
//!   copying a payload to detect a concurrent writer.
//! - `locked`: mutual exclusion between in-place writers.
//! - `replaced`: terminal flag. Once set, the slot has been superseded by a
//!   relocated copy and no lock attempt on it can succeed again.
//!
//! Writers never block: contention is resolved by spinning with a yield, and
//! a bound violation fails immediately so the engine can fall back to its
//! copy-forward path.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

/// Mask for the staleness field (low 32 bits).
const STALENESS_MASK: u64 = (1 << 32) - 1;

/// Shift for the generation field.
const GENERATION_SHIFT: u32 = 32;

/// Number of bits in the generation field.
pub const GENERATION_BITS: u32 = 30;

/// Mask for the generation field (after shifting).
const GENERATION_MASK: u64 = (1 << GENERATION_BITS) - 1;

/// Bit position for the locked flag.
const LOCKED_BIT: u64 = 1 << 62;

/// Bit position for the replaced flag.
const REPLACED_BIT: u64 = 1 << 63;

/// Staleness bound that never rejects an acquisition.
pub const UNBOUNDED: i32 = i32::MAX;

/// A decoded snapshot of the control word.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct GenLock(u64);

impl GenLock {
    /// Pack the four fields into a control word.
    ///
    /// `generation` is truncated to its 30-bit field.
    #[inline]
    pub const fn pack(staleness: i32, generation: u32, locked: bool, replaced: bool) -> Self {
        let mut control = (staleness as u32) as u64;
        control |= ((generation as u64) & GENERATION_MASK) << GENERATION_SHIFT;
        if locked {
            control |= LOCKED_BIT;
        }
        if replaced {
            control |= REPLACED_BIT;
        }
        Self(control)
    }

    /// Unpack into `(staleness, generation, locked, replaced)`.
    #[inline]
    pub const fn unpack(self) -> (i32, u32, bool, bool) {
        (
            self.staleness(),
            self.generation(),
            self.is_locked(),
            self.is_replaced(),
        )
    }

    /// Create from a raw control value.
    #[inline]
    pub const fn from_control(control: u64) -> Self {
        Self(control)
    }

    /// Get the raw control value.
    #[inline]
    pub const fn control(self) -> u64 {
        self.0
    }

    /// Signed staleness counter.
    #[inline]
    pub const fn staleness(self) -> i32 {
        (self.0 & STALENESS_MASK) as u32 as i32
    }

    /// 30-bit generation counter.
    #[inline]
    pub const fn generation(self) -> u32 {
        ((self.0 >> GENERATION_SHIFT) & GENERATION_MASK) as u32
    }

    /// Whether a writer currently holds the lock.
    #[inline]
    pub const fn is_locked(self) -> bool {
        (self.0 & LOCKED_BIT) != 0
    }

    /// Whether this slot has been abandoned in favor of a relocated copy.
    #[inline]
    pub const fn is_replaced(self) -> bool {
        (self.0 & REPLACED_BIT) != 0
    }

    /// Same word with a different staleness.
    #[inline]
    pub const fn with_staleness(self, staleness: i32) -> Self {
        Self((self.0 & !STALENESS_MASK) | ((staleness as u32) as u64))
    }

    /// Same word with the locked flag set or cleared.
    #[inline]
    pub const fn with_locked(self, locked: bool) -> Self {
        if locked {
            Self(self.0 | LOCKED_BIT)
        } else {
            Self(self.0 & !LOCKED_BIT)
        }
    }

    /// Word after an unlock: lock cleared, generation bumped, and the
    /// replaced flag set when abandoning.
    #[inline]
    pub const fn released(self, replaced: bool) -> Self {
        let next_generation = (self.generation() as u64 + 1) & GENERATION_MASK;
        let mut control = self.0 & !(LOCKED_BIT | (GENERATION_MASK << GENERATION_SHIFT));
        control |= next_generation << GENERATION_SHIFT;
        if replaced {
            control |= REPLACED_BIT;
        }
        Self(control)
    }
}

impl fmt::Debug for GenLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenLock")
            .field("staleness", &self.staleness())
            .field("generation", &self.generation())
            .field("locked", &self.is_locked())
            .field("replaced", &self.is_replaced())
            .finish()
    }
}

/// Result of a single lock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The lock is held by the caller and the increment was applied.
    Acquired,
    /// Another writer holds the lock, or won the CAS race. Retry.
    Contended,
    /// Applying the increment would exceed the staleness bound. Nothing changed.
    BoundExceeded,
    /// The slot was abandoned. The caller must go back through the engine.
    Replaced,
}

impl LockOutcome {
    /// Whether the lock was acquired.
    #[inline]
    pub const fn acquired(self) -> bool {
        matches!(self, LockOutcome::Acquired)
    }

    /// Whether the slot has been replaced.
    #[inline]
    pub const fn replaced(self) -> bool {
        matches!(self, LockOutcome::Replaced)
    }
}

/// The atomic control word stored at the head of every value slot.
#[repr(transparent)]
pub struct AtomicGenLock {
    control: AtomicU64,
}

impl AtomicGenLock {
    /// Create a lock word with the given initial fields.
    pub const fn new(initial: GenLock) -> Self {
        Self {
            control: AtomicU64::new(initial.0),
        }
    }

    /// Load the current word.
    #[inline]
    pub fn load(&self) -> GenLock {
        GenLock(self.control.load(Ordering::Acquire))
    }

    /// Overwrite the word. Only valid while the slot is exclusively owned.
    #[inline]
    pub fn store(&self, desired: GenLock) {
        self.control.store(desired.0, Ordering::Release);
    }

    /// Make one attempt to take the lock, adding `staleness_incr` to the
    /// staleness counter.
    ///
    /// The attempt is refused without touching the word when the slot is
    /// replaced, already locked, or when `staleness + staleness_incr` would
    /// exceed `staleness_bound` (arithmetic overflow counts as exceeding).
    pub fn try_lock(&self, staleness_incr: i32, staleness_bound: i32) -> LockOutcome {
        let current = self.load();
        if current.is_replaced() {
            return LockOutcome::Replaced;
        }
        if current.is_locked() {
            return LockOutcome::Contended;
        }
        let staleness = match current.staleness().checked_add(staleness_incr) {
            Some(s) if s <= staleness_bound => s,
            _ => return LockOutcome::BoundExceeded,
        };
        let desired = current.with_locked(true).with_staleness(staleness);

        match self.control.compare_exchange(
            current.0,
            desired.0,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => LockOutcome::Acquired,
            Err(actual) if GenLock(actual).is_replaced() => LockOutcome::Replaced,
            Err(_) => LockOutcome::Contended,
        }
    }

    /// Spin until the lock is acquired or refused for a reason other than
    /// contention. Yields to the scheduler between attempts.
    pub fn lock_spin(&self, staleness_incr: i32, staleness_bound: i32) -> LockOutcome {
        loop {
            match self.try_lock(staleness_incr, staleness_bound) {
                LockOutcome::Contended => thread::yield_now(),
                outcome => return outcome,
            }
        }
    }

    /// Release the lock, bumping the generation.
    ///
    /// With `replaced` set the slot is abandoned: every later lock attempt
    /// reports [`LockOutcome::Replaced`].
    pub fn unlock(&self, replaced: bool) {
        let previous = self
            .control
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |control| {
                Some(GenLock(control).released(replaced).0)
            });
        debug_assert!(
            previous.map(|c| GenLock(c).is_locked()).unwrap_or(false),
            "unlock of a generation lock that was not held"
        );
    }

    /// Abandon the slot so that late in-place writers fail over.
    ///
    /// Waits out any current holder, ignores the staleness budget, and
    /// leaves the staleness counter unchanged. Returns `false` when the slot
    /// was already replaced.
    pub fn seal(&self) -> bool {
        match self.lock_spin(0, UNBOUNDED) {
            LockOutcome::Acquired => {
                self.unlock(true);
                true
            }
            _ => false,
        }
    }
}

impl Default for AtomicGenLock {
    fn default() -> Self {
        Self::new(GenLock::default())
    }
}

impl fmt::Debug for AtomicGenLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(), f)
    }
}

// The control word must stay exactly 8 bytes.
const _: () = assert!(std::mem::size_of::<AtomicGenLock>() == 8);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_pack_unpack() {
        let word = GenLock::pack(-7, 12345, true, false);
        assert_eq!(word.unpack(), (-7, 12345, true, false));

        let word = GenLock::pack(i32::MAX, (1 << GENERATION_BITS) - 1, false, true);
        assert_eq!(word.staleness(), i32::MAX);
        assert_eq!(word.generation(), (1 << GENERATION_BITS) - 1);
        assert!(!word.is_locked());
        assert!(word.is_replaced());
    }

    #[test]
    fn test_bit_layout() {
        assert_eq!(GenLock::pack(0, 0, true, false).control(), 1 << 62);
        assert_eq!(GenLock::pack(0, 0, false, true).control(), 1 << 63);
        assert_eq!(GenLock::pack(0, 1, false, false).control(), 1 << 32);
        assert_eq!(GenLock::pack(-1, 0, false, false).control(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_try_lock_applies_increment() {
        let lock = AtomicGenLock::default();
        assert_eq!(lock.try_lock(3, 10), LockOutcome::Acquired);
        let word = lock.load();
        assert!(word.is_locked());
        assert_eq!(word.staleness(), 3);
        assert_eq!(word.generation(), 0);
    }

    #[test]
    fn test_try_lock_contended() {
        let lock = AtomicGenLock::default();
        assert!(lock.try_lock(0, UNBOUNDED).acquired());
        assert_eq!(lock.try_lock(0, UNBOUNDED), LockOutcome::Contended);
        lock.unlock(false);
        assert!(lock.try_lock(0, UNBOUNDED).acquired());
    }

    #[test]
    fn test_bound_exceeded_is_a_no_op() {
        let lock = AtomicGenLock::new(GenLock::pack(127, 4, false, false));
        let before = lock.load();
        assert_eq!(lock.try_lock(2, 128), LockOutcome::BoundExceeded);
        assert_eq!(lock.load(), before);

        assert_eq!(lock.try_lock(1, 128), LockOutcome::Acquired);
        lock.unlock(false);
        assert_eq!(lock.load().staleness(), 128);
        assert_eq!(lock.try_lock(1, 128), LockOutcome::BoundExceeded);
    }

    #[test]
    fn test_staleness_overflow_counts_as_exceeded() {
        let lock = AtomicGenLock::new(GenLock::pack(i32::MAX, 0, false, false));
        assert_eq!(lock.try_lock(1, UNBOUNDED), LockOutcome::BoundExceeded);

        let lock = AtomicGenLock::new(GenLock::pack(i32::MIN, 0, false, false));
        assert_eq!(lock.try_lock(-1, 128), LockOutcome::BoundExceeded);
    }

    #[test]
    fn test_unlock_bumps_generation_only() {
        let lock = AtomicGenLock::new(GenLock::pack(5, 9, false, false));
        assert!(lock.try_lock(-1, 128).acquired());
        assert_eq!(lock.load().generation(), 9);
        lock.unlock(false);
        let word = lock.load();
        assert_eq!(word.unpack(), (4, 10, false, false));
    }

    #[test]
    fn test_generation_wraps() {
        let max = (1 << GENERATION_BITS) - 1;
        let lock = AtomicGenLock::new(GenLock::pack(0, max, false, false));
        assert!(lock.try_lock(0, UNBOUNDED).acquired());
        lock.unlock(false);
        let word = lock.load();
        assert_eq!(word.generation(), 0);
        assert!(!word.is_locked());
        assert!(!word.is_replaced());
    }

    #[test]
    fn test_abandon_is_terminal() {
        let lock = AtomicGenLock::default();
        assert!(lock.try_lock(0, UNBOUNDED).acquired());
        lock.unlock(true);

        let word = lock.load();
        assert!(word.is_replaced());
        assert!(!word.is_locked());
        assert_eq!(word.generation(), 1);

        for _ in 0..3 {
            let outcome = lock.try_lock(0, UNBOUNDED);
            assert!(outcome.replaced());
            assert!(!outcome.acquired());
        }
        // Even a bound violation reports the replacement first.
        assert_eq!(lock.try_lock(i32::MAX, 0), LockOutcome::Replaced);
    }

    #[test]
    fn test_seal() {
        let lock = AtomicGenLock::new(GenLock::pack(42, 0, false, false));
        assert!(lock.seal());
        assert!(!lock.seal());
        let word = lock.load();
        assert!(word.is_replaced());
        assert_eq!(word.staleness(), 42);
    }

    #[test]
    fn test_concurrent_mutual_exclusion() {
        let lock = Arc::new(AtomicGenLock::default());
        let inside = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            let inside = Arc::clone(&inside);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    assert!(lock.lock_spin(0, UNBOUNDED).acquired());
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    inside.fetch_sub(1, Ordering::SeqCst);
                    lock.unlock(false);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(lock.load().generation(), 4000);
    }
}
