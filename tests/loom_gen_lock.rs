//! Loom-based model-checked tests for the generation lock protocol.
//!
//! The harness below mirrors the packed control word of
//! `src/gen_lock.rs` on loom atomics, so every interleaving of lockers,
//! sealers and optimistic readers is explored without touching the
//! production type.
//!
//! Run with:
//! ```bash
//! cargo test --test loom_gen_lock
//! ```

use loom::sync::atomic::{AtomicU64, Ordering};
use loom::sync::Arc;
use loom::thread;

const STALENESS_MASK: u64 = 0xFFFF_FFFF;
const GENERATION_SHIFT: u32 = 32;
const GENERATION_MASK: u64 = (1 << 30) - 1;
const LOCKED: u64 = 1 << 62;
const REPLACED: u64 = 1 << 63;

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Acquired,
    BoundExceeded,
    Replaced,
}

fn staleness(word: u64) -> i32 {
    (word & STALENESS_MASK) as u32 as i32
}

fn generation(word: u64) -> u64 {
    (word >> GENERATION_SHIFT) & GENERATION_MASK
}

fn with_staleness(word: u64, staleness: i32) -> u64 {
    (word & !STALENESS_MASK) | (staleness as u32 as u64)
}

// ---------------------------------------------------------------------------
// Test-local harness: a value slot guarded by the control word.
// ---------------------------------------------------------------------------

struct Slot {
    control: AtomicU64,
    payload: AtomicU64,
}

impl Slot {
    fn new() -> Self {
        Self {
            control: AtomicU64::new(0),
            payload: AtomicU64::new(0),
        }
    }

    fn lock(&self, incr: i32, bound: i32) -> Outcome {
        loop {
            let current = self.control.load(Ordering::Acquire);
            if current & REPLACED != 0 {
                return Outcome::Replaced;
            }
            if current & LOCKED != 0 {
                thread::yield_now();
                continue;
            }
            let next = match staleness(current).checked_add(incr) {
                Some(s) if s <= bound => s,
                _ => return Outcome::BoundExceeded,
            };
            let desired = with_staleness(current, next) | LOCKED;
            if self
                .control
                .compare_exchange(current, desired, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Outcome::Acquired;
            }
        }
    }

    fn unlock(&self, replaced: bool) {
        let current = self.control.load(Ordering::Acquire);
        let generation = (generation(current) + 1) & GENERATION_MASK;
        let mut next = (current & STALENESS_MASK) | (generation << GENERATION_SHIFT);
        if replaced {
            next |= REPLACED;
        }
        self.control.store(next, Ordering::Release);
    }

    /// Give up a held slot after reverting its increment.
    fn abandon(&self, incr: i32) {
        let current = self.control.load(Ordering::Acquire);
        self.control
            .store(with_staleness(current, staleness(current).wrapping_sub(incr)), Ordering::Release);
        self.unlock(true);
    }

    /// Optimistic read: retry until the generation is stable and unlocked.
    fn read(&self) -> (u64, u64) {
        loop {
            let before = self.control.load(Ordering::Acquire);
            if before & LOCKED != 0 {
                thread::yield_now();
                continue;
            }
            let payload = self.payload.load(Ordering::Acquire);
            let after = self.control.load(Ordering::Acquire);
            if generation(before) == generation(after) && after & LOCKED == 0 {
                return (payload, after);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Two lockers with opposite increments: both apply exactly once.
#[test]
fn test_loom_staleness_increments_serialize() {
    loom::model(|| {
        let slot = Arc::new(Slot::new());

        let handles: Vec<_> = [1, -1]
            .into_iter()
            .map(|incr| {
                let slot = Arc::clone(&slot);
                thread::spawn(move || {
                    assert_eq!(slot.lock(incr, 128), Outcome::Acquired);
                    slot.payload.fetch_add(1, Ordering::Relaxed);
                    slot.unlock(false);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let word = slot.control.load(Ordering::Acquire);
        assert_eq!(staleness(word), 0);
        assert_eq!(generation(word), 2);
        assert_eq!(slot.payload.load(Ordering::Acquire), 2);
    });
}

/// A sealer racing a writer: the writer either lands before the seal or
/// sees the slot replaced, never both.
#[test]
fn test_loom_seal_versus_writer() {
    loom::model(|| {
        let slot = Arc::new(Slot::new());

        let writer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || match slot.lock(1, 128) {
                Outcome::Acquired => {
                    slot.payload.store(7, Ordering::Relaxed);
                    slot.unlock(false);
                    true
                }
                outcome => {
                    assert_eq!(outcome, Outcome::Replaced);
                    false
                }
            })
        };
        let sealer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                assert_eq!(slot.lock(0, i32::MAX), Outcome::Acquired);
                let payload = slot.payload.load(Ordering::Relaxed);
                let word = slot.control.load(Ordering::Acquire);
                slot.unlock(true);
                (payload, staleness(word))
            })
        };

        let wrote = writer.join().unwrap();
        let (sealed_payload, sealed_staleness) = sealer.join().unwrap();
        if wrote {
            assert_eq!((sealed_payload, sealed_staleness), (7, 1));
        } else {
            assert_eq!((sealed_payload, sealed_staleness), (0, 0));
        }
        assert_ne!(slot.control.load(Ordering::Acquire) & REPLACED, 0);
    });
}

/// An abandoned lock leaves the staleness as it found it.
#[test]
fn test_loom_abandon_reverts_increment() {
    loom::model(|| {
        let slot = Arc::new(Slot::new());

        let abandoner = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                if slot.lock(1, 128) == Outcome::Acquired {
                    slot.abandon(1);
                }
            })
        };
        let reader = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                let (_, word) = slot.read();
                staleness(word)
            })
        };

        abandoner.join().unwrap();
        assert_eq!(reader.join().unwrap(), 0);
        let word = slot.control.load(Ordering::Acquire);
        assert_eq!(staleness(word), 0);
        assert_ne!(word & REPLACED, 0);
    });
}

/// Optimistic readers never observe a payload written under a lock they
/// did not see released.
#[test]
fn test_loom_reader_sees_consistent_generation() {
    loom::model(|| {
        let slot = Arc::new(Slot::new());

        let writer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                assert_eq!(slot.lock(0, 128), Outcome::Acquired);
                slot.payload.store(1, Ordering::Release);
                slot.unlock(false);
            })
        };
        let reader = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.read())
        };

        writer.join().unwrap();
        let (payload, word) = reader.join().unwrap();
        assert_eq!(payload, generation(word));
    });
}

/// The bound refuses the locker without changing the word.
#[test]
fn test_loom_bound_exceeded_leaves_word() {
    loom::model(|| {
        let slot = Arc::new(Slot::new());
        slot.control.store(with_staleness(0, 128), Ordering::Release);

        let a = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.lock(1, 128))
        };
        let b = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.lock(1, 128))
        };

        assert_eq!(a.join().unwrap(), Outcome::BoundExceeded);
        assert_eq!(b.join().unwrap(), Outcome::BoundExceeded);
        assert_eq!(slot.control.load(Ordering::Acquire), with_staleness(0, 128));
    });
}
