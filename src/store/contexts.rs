//! Operation contexts
//!
//! This module defines the context traits the store calls back into while
//! executing an operation. A context is cloned into the session's pending
//! queue when an operation cannot complete synchronously, so every context
//! must own its data.

use crate::record::Key;
use crate::value::{Value, VALUE_HEADER_SIZE};

/// Context trait for Read operations
pub trait ReadContext: Clone + Send + 'static {
    /// Get the key to read
    fn key(&self) -> Key;

    /// Copy out a value no writer can touch any more.
    fn get(&mut self, value: &Value<'_>);

    /// Copy out a value that writers may be updating in place.
    fn get_atomic(&mut self, value: &Value<'_>);
}

/// Context trait for Upsert operations
pub trait UpsertContext: Clone + Send + 'static {
    /// Get the key to upsert
    fn key(&self) -> Key;

    /// Full value slot size (header included) for a new record.
    fn value_size(&self) -> usize;

    /// Fill a freshly allocated slot.
    fn put(&mut self, value: &mut Value<'_>);

    /// Overwrite a mutable record in place.
    ///
    /// Returns `false` when the record cannot take the update; the store
    /// then appends a new record instead.
    fn put_atomic(&mut self, value: &Value<'_>) -> bool;
}

/// Context trait for RMW (Read-Modify-Write) operations
pub trait RmwContext: Clone + Send + 'static {
    /// Get the key
    fn key(&self) -> Key;

    /// Value slot size for a record created from nothing.
    fn value_size(&self) -> usize;

    /// Value slot size for a record copied forward from `old`.
    fn value_size_from(&self, old: &Value<'_>) -> usize;

    /// Whether an absent key gets a new record.
    ///
    /// Returning `false` completes the operation with `Status::NotFound`
    /// before any log space is reserved.
    fn create_if_absent(&self) -> bool {
        true
    }

    /// Create the first record for the key.
    ///
    /// Returning `false` declines creation: the reserved record is
    /// invalidated and the operation completes with `Status::NotFound`.
    fn rmw_initial(&mut self, value: &mut Value<'_>) -> bool;

    /// Build a new record from an existing one that cannot be updated in
    /// place.
    fn rmw_copy(&mut self, old: &Value<'_>, value: &mut Value<'_>);

    /// Update a mutable record in place.
    ///
    /// Returns `false` when the record cannot take the update; the store
    /// then copies it forward with [`RmwContext::rmw_copy`].
    fn rmw_atomic(&mut self, value: &Value<'_>) -> bool;
}

/// Context trait for Delete operations
pub trait DeleteContext: Clone + Send + 'static {
    /// Get the key to delete
    fn key(&self) -> Key;

    /// Value slot size of the tombstone record.
    fn value_size(&self) -> usize {
        VALUE_HEADER_SIZE
    }
}
