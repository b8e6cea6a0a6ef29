//! Plain contexts: read, upsert, delete and additive RMW.

use crate::gen_lock::{GenLock, UNBOUNDED};
use crate::record::Key;
use crate::store::{DeleteContext, ReadContext, RmwContext, UpsertContext};
use crate::value::{Value, VALUE_HEADER_SIZE};

/// Copies the value out.
#[derive(Debug, Clone)]
pub struct SimpleReadContext {
    key: Key,
    value: Vec<u8>,
}

impl SimpleReadContext {
    /// Create a read of `key`.
    pub fn new(key: Key) -> Self {
        Self {
            key,
            value: Vec::new(),
        }
    }

    /// Payload read by the last completed operation.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Take the payload read.
    pub fn into_value(self) -> Vec<u8> {
        self.value
    }
}

impl ReadContext for SimpleReadContext {
    fn key(&self) -> Key {
        self.key
    }

    fn get(&mut self, value: &Value<'_>) {
        value.copy_to(&mut self.value);
    }

    fn get_atomic(&mut self, value: &Value<'_>) {
        value.copy_atomic_to(&mut self.value);
    }
}

/// Writes a whole payload.
#[derive(Debug, Clone)]
pub struct SimpleUpsertContext {
    key: Key,
    value: Vec<u8>,
}

impl SimpleUpsertContext {
    /// Create an upsert of `value` under `key`.
    pub fn new(key: Key, value: Vec<u8>) -> Self {
        Self { key, value }
    }
}

impl UpsertContext for SimpleUpsertContext {
    fn key(&self) -> Key {
        self.key
    }

    fn value_size(&self) -> usize {
        VALUE_HEADER_SIZE + self.value.len()
    }

    fn put(&mut self, value: &mut Value<'_>) {
        value.init(GenLock::default(), &self.value);
    }

    fn put_atomic(&mut self, value: &Value<'_>) -> bool {
        let Ok(mut guard) = value.lock(0, UNBOUNDED) else {
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

/// Adds little-endian `u64` counters elementwise to the stored payload.
///
/// Only existing records can be incremented: reaching the create path is a
/// caller bug and panics. Records that cannot be updated in place are
/// copied forward with the increments applied and their staleness kept.
#[derive(Debug, Clone)]
pub struct IncrementContext {
    key: Key,
    increments: Vec<u8>,
}

impl IncrementContext {
    /// Create an increment of `key` by the counters packed in `increments`.
    pub fn new(key: Key, increments: Vec<u8>) -> Self {
        Self { key, increments }
    }

    /// Increment a single counter.
    pub fn from_u64(key: Key, increment: u64) -> Self {
        Self::new(key, bytemuck::bytes_of(&increment.to_le()).to_vec())
    }

    fn apply(&self, payload: &mut [u8]) {
        for (counter, incr) in payload.chunks_exact_mut(8).zip(self.increments.chunks_exact(8)) {
            let current = u64::from_le(bytemuck::pod_read_unaligned::<u64>(counter));
            let incr = u64::from_le(bytemuck::pod_read_unaligned::<u64>(incr));
            counter.copy_from_slice(&current.wrapping_add(incr).to_le_bytes());
        }
    }
}

impl RmwContext for IncrementContext {
    fn key(&self) -> Key {
        self.key
    }

    fn value_size(&self) -> usize {
        VALUE_HEADER_SIZE + self.increments.len()
    }

    fn value_size_from(&self, old: &Value<'_>) -> usize {
        VALUE_HEADER_SIZE + old.length()
    }

    fn rmw_initial(&mut self, _value: &mut Value<'_>) -> bool {
        panic!("increment of absent key {}: counters must be created with an upsert first", self.key);
    }

    fn rmw_copy(&mut self, old: &Value<'_>, value: &mut Value<'_>) {
        let mut payload = Vec::new();
        let lock = old.copy_atomic_to(&mut payload);
        self.apply(&mut payload);
        value.init(GenLock::pack(lock.staleness(), 0, false, false), &payload);
    }

    fn rmw_atomic(&mut self, value: &Value<'_>) -> bool {
        let Ok(mut guard) = value.lock(0, UNBOUNDED) else {
            return false;
        };
        let len = guard.payload().len();
        self.apply(&mut guard.payload_mut()[..len]);
        true
    }
}

/// Deletes a key.
#[derive(Debug, Clone)]
pub struct SimpleDeleteContext {
    key: Key,
}

impl SimpleDeleteContext {
    /// Create a delete of `key`.
    pub fn new(key: Key) -> Self {
        Self { key }
    }
}

impl DeleteContext for SimpleDeleteContext {
    fn key(&self) -> Key {
        self.key
    }
}
