//! Session management for FASTER
//!
//! Every operation is issued through a session. A session owns the queue of
//! operations that went pending on cold records and completes them, invoking
//! their callbacks, from [`Session::complete_pending`].
//!
//! ## Session Persistence
//!
//! Sessions support persistence through checkpoint/recovery:
//! - Each session has a unique GUID for identification
//! - A monotonically increasing serial number tracks operations
//! - Session state is saved with each checkpoint and restored by
//!   [`FasterKv::continue_session`]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::checkpoint::SessionState;
use crate::status::{OperationType, Status};
use crate::store::{DeleteContext, FasterKv, ReadContext, RmwContext, UpsertContext};

/// Operation parked on a cold record, re-run by `complete_pending`.
type PendingOperation = Box<dyn FnOnce(&FasterKv) + Send + 'static>;

/// Session for FASTER operations
///
/// Sessions are not thread-safe and should be used from a single thread.
pub struct Session {
    store: Arc<FasterKv>,
    guid: Uuid,
    thread_id: usize,
    /// Serial number shared with the store's session registry
    serial_num: Arc<AtomicU64>,
    pending: VecDeque<(OperationType, PendingOperation)>,
}

impl Session {
    pub(crate) fn new(store: Arc<FasterKv>, guid: Uuid, thread_id: usize, serial_num: Arc<AtomicU64>) -> Self {
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(guid = %guid, thread_id, "session started");
        }
        Self {
            store,
            guid,
            thread_id,
            serial_num,
            pending: VecDeque::new(),
        }
    }

    /// Session GUID
    pub fn guid(&self) -> Uuid {
        self.guid
    }

    /// Session number within the store
    pub fn thread_id(&self) -> usize {
        self.thread_id
    }

    /// Number of operations issued by this session
    pub fn serial_num(&self) -> u64 {
        self.serial_num.load(Ordering::Acquire)
    }

    /// Persistable state of this session
    pub fn to_session_state(&self) -> SessionState {
        SessionState::new(self.guid, self.serial_num())
    }

    /// The store this session operates on
    pub fn store(&self) -> &Arc<FasterKv> {
        &self.store
    }

    /// Number of operations waiting in the pending queue
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    fn next_serial(&self) {
        self.serial_num.fetch_add(1, Ordering::AcqRel);
    }

    fn park(&mut self, op: OperationType, pending: PendingOperation) {
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(guid = %self.guid, op = %op, queued = self.pending.len() + 1, "operation pending");
        }
        self.pending.push_back((op, pending));
    }

    /// Read the context's key.
    ///
    /// On `Status::Pending` a copy of the context is queued and `callback`
    /// receives it with the final status during `complete_pending`;
    /// otherwise the context has been filled in and `callback` is dropped.
    pub fn read<C, F>(&mut self, ctx: &mut C, callback: F) -> Status
    where
        C: ReadContext,
        F: FnOnce(C, Status) + Send + 'static,
    {
        self.next_serial();
        let status = self.store.internal_read(ctx, false);
        if status.is_pending() {
            let mut parked = ctx.clone();
            self.park(
                OperationType::Read,
                Box::new(move |store: &FasterKv| {
                    let status = store.internal_read(&mut parked, true);
                    callback(parked, status);
                }),
            );
        }
        status
    }

    /// Insert or overwrite the context's key.
    pub fn upsert<C, F>(&mut self, ctx: &mut C, callback: F) -> Status
    where
        C: UpsertContext,
        F: FnOnce(C, Status) + Send + 'static,
    {
        self.next_serial();
        let status = self.store.internal_upsert(ctx);
        if status.is_pending() {
            let mut parked = ctx.clone();
            self.park(
                OperationType::Upsert,
                Box::new(move |store: &FasterKv| {
                    let status = store.internal_upsert(&mut parked);
                    callback(parked, status);
                }),
            );
        }
        status
    }

    /// Read-modify-write the context's key.
    pub fn rmw<C, F>(&mut self, ctx: &mut C, callback: F) -> Status
    where
        C: RmwContext,
        F: FnOnce(C, Status) + Send + 'static,
    {
        self.next_serial();
        let status = self.store.internal_rmw(ctx, false);
        if status.is_pending() {
            let mut parked = ctx.clone();
            self.park(
                OperationType::Rmw,
                Box::new(move |store: &FasterKv| {
                    let status = store.internal_rmw(&mut parked, true);
                    callback(parked, status);
                }),
            );
        }
        status
    }

    /// Delete the context's key.
    pub fn delete<C, F>(&mut self, ctx: &mut C, callback: F) -> Status
    where
        C: DeleteContext,
        F: FnOnce(C, Status) + Send + 'static,
    {
        self.next_serial();
        let status = self.store.internal_delete(ctx);
        if status.is_pending() {
            let mut parked = ctx.clone();
            self.park(
                OperationType::Delete,
                Box::new(move |store: &FasterKv| {
                    let status = store.internal_delete(&mut parked);
                    callback(parked, status);
                }),
            );
        }
        status
    }

    /// Complete queued pending operations, running their callbacks.
    ///
    /// With `wait` set, keeps draining until the queue is empty, including
    /// operations queued by callbacks. Returns whether the queue is empty.
    pub fn complete_pending(&mut self, wait: bool) -> bool {
        loop {
            let batch: Vec<_> = self.pending.drain(..).collect();
            let completed = batch.len();
            for (_, operation) in batch {
                operation(&self.store);
            }
            if completed > 0 && tracing::enabled!(tracing::Level::DEBUG) {
                tracing::debug!(guid = %self.guid, completed, "pending operations completed");
            }
            if !wait || self.pending.is_empty() {
                return self.pending.is_empty();
            }
        }
    }

    /// End the session, completing anything still pending.
    pub fn stop(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        self.complete_pending(true);
        self.store.unregister_session(self.guid);
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(guid = %self.guid, serial_num = self.serial_num(), "session stopped");
        }
    }
}
