//! Staleness-bounded contexts.
//!
//! Every record carries a signed staleness counter in its lock word. MLKV
//! reads raise it, MLKV writes lower it, and an in-place update is only
//! admitted while the adjusted counter stays within the bound. A rejected
//! update is not an error: the store seals the record and copies it forward
//! through the context's copy hook, which applies the same adjustment.
//!
//! | Hook     | Read (+1)                    | Upsert (-1)          | Lookahead (0)        |
//! |----------|------------------------------|----------------------|----------------------|
//! | initial  | not found, nothing created   | declined             | panics               |
//! | copy     | payload carried and returned | new payload written  | payload carried      |
//! | in place | payload returned             | payload overwritten  | no-op                |

use crate::gen_lock::GenLock;
use crate::record::Key;
use crate::store::RmwContext;
use crate::value::{Value, VALUE_HEADER_SIZE};

/// Staleness increment of an MLKV read.
pub const MLKV_READ_STALENESS_INCR: i32 = 1;

/// Staleness increment of an MLKV upsert.
pub const MLKV_UPSERT_STALENESS_INCR: i32 = -1;

/// Staleness increment of a lookahead.
pub const MLKV_LOOKAHEAD_STALENESS_INCR: i32 = 0;

/// Largest staleness an in-place MLKV update may reach.
pub const MLKV_STALENESS_BOUND: i32 = 128;

/// Staleness increments and bound applied by MLKV operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    /// Increment applied by each read
    pub read_incr: i32,
    /// Increment applied by each upsert
    pub upsert_incr: i32,
    /// Bound checked by in-place updates
    pub bound: i32,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            read_incr: MLKV_READ_STALENESS_INCR,
            upsert_incr: MLKV_UPSERT_STALENESS_INCR,
            bound: MLKV_STALENESS_BOUND,
        }
    }
}

/// Staleness counter of a copied-forward record.
#[inline]
fn carried(old: &Value<'_>, incr: i32) -> GenLock {
    GenLock::pack(old.staleness().saturating_add(incr), 0, false, false)
}

/// Staleness-raising read.
///
/// `found` reports whether the key existed; the payload is returned
/// through [`MlkvReadContext::value`].
#[derive(Debug, Clone)]
pub struct MlkvReadContext {
    key: Key,
    expected_len: usize,
    staleness_incr: i32,
    staleness_bound: i32,
    found: bool,
    output: Vec<u8>,
}

impl MlkvReadContext {
    /// Read of `key` expecting an `expected_len`-byte payload, with the
    /// default policy.
    pub fn new(key: Key, expected_len: usize) -> Self {
        Self::with_policy(key, expected_len, &StalenessPolicy::default())
    }

    /// Read of `key` with an explicit policy.
    pub fn with_policy(key: Key, expected_len: usize, policy: &StalenessPolicy) -> Self {
        Self {
            key,
            expected_len,
            staleness_incr: policy.read_incr,
            staleness_bound: policy.bound,
            found: false,
            output: Vec::new(),
        }
    }

    /// Whether the key existed.
    pub fn found(&self) -> bool {
        self.found
    }

    /// Payload read.
    pub fn value(&self) -> &[u8] {
        &self.output
    }

    /// Take the payload read.
    pub fn into_value(self) -> Vec<u8> {
        self.output
    }
}

impl RmwContext for MlkvReadContext {
    fn key(&self) -> Key {
        self.key
    }

    fn value_size(&self) -> usize {
        VALUE_HEADER_SIZE + self.expected_len
    }

    fn value_size_from(&self, old: &Value<'_>) -> usize {
        VALUE_HEADER_SIZE + self.expected_len.max(old.length())
    }

    fn create_if_absent(&self) -> bool {
        false
    }

    fn rmw_initial(&mut self, _value: &mut Value<'_>) -> bool {
        self.found = false;
        false
    }

    fn rmw_copy(&mut self, old: &Value<'_>, value: &mut Value<'_>) {
        old.copy_atomic_to(&mut self.output);
        value.init(carried(old, self.staleness_incr), &self.output);
        self.found = true;
    }

    fn rmw_atomic(&mut self, value: &Value<'_>) -> bool {
        let Ok(guard) = value.lock(self.staleness_incr, self.staleness_bound) else {
            return false;
        };
        if !guard.fits(self.expected_len) {
            guard.abandon();
            return false;
        }
        self.output.clear();
        self.output.extend_from_slice(guard.payload());
        self.found = true;
        true
    }
}

/// Staleness-lowering write.
///
/// Only updates existing records; an absent key is left absent.
#[derive(Debug, Clone)]
pub struct MlkvUpsertContext {
    key: Key,
    value: Vec<u8>,
    staleness_incr: i32,
    staleness_bound: i32,
}

impl MlkvUpsertContext {
    /// Write of `value` under `key` with the default policy.
    pub fn new(key: Key, value: Vec<u8>) -> Self {
        Self::with_policy(key, value, &StalenessPolicy::default())
    }

    /// Write with an explicit policy.
    pub fn with_policy(key: Key, value: Vec<u8>, policy: &StalenessPolicy) -> Self {
        Self {
            key,
            value,
            staleness_incr: policy.upsert_incr,
            staleness_bound: policy.bound,
        }
    }
}

impl RmwContext for MlkvUpsertContext {
    fn key(&self) -> Key {
        self.key
    }

    fn value_size(&self) -> usize {
        VALUE_HEADER_SIZE + self.value.len()
    }

    fn value_size_from(&self, _old: &Value<'_>) -> usize {
        VALUE_HEADER_SIZE + self.value.len()
    }

    fn create_if_absent(&self) -> bool {
        false
    }

    fn rmw_initial(&mut self, _value: &mut Value<'_>) -> bool {
        false
    }

    fn rmw_copy(&mut self, old: &Value<'_>, value: &mut Value<'_>) {
        value.init(carried(old, self.staleness_incr), &self.value);
    }

    fn rmw_atomic(&mut self, value: &Value<'_>) -> bool {
        let Ok(mut guard) = value.lock(self.staleness_incr, self.staleness_bound) else {
            return false;
        };
        if !guard.fits(self.value.len()) {
            guard.abandon();
            return false;
        }
        guard.write(&self.value);
        true
    }
}

/// Carries a record forward unchanged.
///
/// Used to move records out of a log range being compacted: payload bytes
/// and staleness are preserved, only the location changes. The key must
/// exist; reaching the create path panics.
#[derive(Debug, Clone)]
pub struct MlkvLookaheadContext {
    key: Key,
    len: usize,
}

impl MlkvLookaheadContext {
    /// Lookahead of `key` with a payload length hint.
    pub fn new(key: Key, len: usize) -> Self {
        Self { key, len }
    }
}

impl RmwContext for MlkvLookaheadContext {
    fn key(&self) -> Key {
        self.key
    }

    fn value_size(&self) -> usize {
        VALUE_HEADER_SIZE + self.len
    }

    fn value_size_from(&self, old: &Value<'_>) -> usize {
        VALUE_HEADER_SIZE + old.length()
    }

    fn rmw_initial(&mut self, _value: &mut Value<'_>) -> bool {
        panic!("lookahead of absent key {}: only existing records can be carried forward", self.key);
    }

    fn rmw_copy(&mut self, old: &Value<'_>, value: &mut Value<'_>) {
        let mut payload = Vec::with_capacity(old.length());
        old.copy_atomic_to(&mut payload);
        value.init(carried(old, MLKV_LOOKAHEAD_STALENESS_INCR), &payload);
    }

    fn rmw_atomic(&mut self, _value: &Value<'_>) -> bool {
        true
    }
}
