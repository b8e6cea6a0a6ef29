//! Async session management for FASTER
//!
//! Async wrappers over [`Session`] for use inside a tokio runtime.
//!
//! ## Pending Status Handling
//!
//! When an operation returns `Status::Pending` the record is cold and the
//! operation was queued on the session. The async wrappers will:
//! 1. Drive the queue via `complete_pending(false)`
//! 2. Yield to allow other tasks to run
//! 3. Repeat up to `MAX_PENDING_RETRIES` times
//! 4. Return `Status::Pending` to the caller if retries are exhausted
//!
//! ## Example
//!
//! ```ignore
//! use mlkv::contexts::SimpleReadContext;
//! use mlkv::Key;
//!
//! async fn example(store: std::sync::Arc<mlkv::FasterKv>) {
//!     let mut session = store.start_async_session();
//!     let (ctx, status) = session.read_async(SimpleReadContext::new(Key(1))).await;
//!     if status.is_ok() {
//!         println!("{:?}", ctx.value());
//!     }
//! }
//! ```

use std::sync::Arc;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::status::Status;
use crate::store::{DeleteContext, FasterKv, ReadContext, RmwContext, Session, UpsertContext};

/// Maximum number of drive-and-yield rounds before returning Pending to the caller.
const MAX_PENDING_RETRIES: u32 = 10;

/// Async session for FASTER operations
///
/// Each async operation hands back the context together with its final
/// status, so callers read results off the context as with the
/// synchronous API.
pub struct AsyncSession {
    /// Inner synchronous session
    inner: Session,
}

impl FasterKv {
    /// Start a new async session
    pub fn start_async_session(self: &Arc<Self>) -> AsyncSession {
        AsyncSession::new(self.start_session())
    }
}

impl AsyncSession {
    /// Create a new async session wrapping a synchronous session
    pub fn new(inner: Session) -> Self {
        Self { inner }
    }

    /// Session GUID
    pub fn guid(&self) -> Uuid {
        self.inner.guid()
    }

    /// Number of operations issued by this session
    pub fn serial_num(&self) -> u64 {
        self.inner.serial_num()
    }

    /// The wrapped synchronous session
    pub fn session(&mut self) -> &mut Session {
        &mut self.inner
    }

    /// Issue one operation and, if it goes pending, drive the session until
    /// its callback delivers the context back.
    async fn drive<C, F>(&mut self, mut ctx: C, issue: F) -> (C, Status)
    where
        C: Send + 'static,
        F: FnOnce(&mut Session, &mut C, oneshot::Sender<(C, Status)>) -> Status,
    {
        let (tx, mut rx) = oneshot::channel();
        let status = issue(&mut self.inner, &mut ctx, tx);
        if !status.is_pending() {
            return (ctx, status);
        }

        for _ in 0..=MAX_PENDING_RETRIES {
            self.inner.complete_pending(false);
            if let Ok(done) = rx.try_recv() {
                return done;
            }
            tokio::task::yield_now().await;
        }
        (ctx, Status::Pending)
    }

    /// Async read operation
    ///
    /// # Returns
    /// - the context and `Status::Ok` if the key was found
    /// - `Status::NotFound` if the key was not found
    /// - `Status::Pending` if the operation couldn't complete after retries
    pub async fn read_async<C: ReadContext>(&mut self, ctx: C) -> (C, Status) {
        self.drive(ctx, |session, ctx, tx| {
            session.read(ctx, move |ctx, status| {
                let _ = tx.send((ctx, status));
            })
        })
        .await
    }

    /// Async upsert operation
    pub async fn upsert_async<C: UpsertContext>(&mut self, ctx: C) -> (C, Status) {
        self.drive(ctx, |session, ctx, tx| {
            session.upsert(ctx, move |ctx, status| {
                let _ = tx.send((ctx, status));
            })
        })
        .await
    }

    /// Async RMW (read-modify-write) operation
    pub async fn rmw_async<C: RmwContext>(&mut self, ctx: C) -> (C, Status) {
        self.drive(ctx, |session, ctx, tx| {
            session.rmw(ctx, move |ctx, status| {
                let _ = tx.send((ctx, status));
            })
        })
        .await
    }

    /// Async delete operation
    pub async fn delete_async<C: DeleteContext>(&mut self, ctx: C) -> (C, Status) {
        self.drive(ctx, |session, ctx, tx| {
            session.delete(ctx, move |ctx, status| {
                let _ = tx.send((ctx, status));
            })
        })
        .await
    }

    /// Complete all pending operations asynchronously
    ///
    /// # Returns
    /// - `true` if all pending operations completed
    /// - `false` if retries exhausted with operations still pending
    pub async fn complete_pending_async(&mut self) -> bool {
        for _ in 0..=MAX_PENDING_RETRIES {
            if self.inner.complete_pending(false) {
                return true;
            }
            tokio::task::yield_now().await;
        }
        false
    }

    /// Complete pending operations synchronously
    pub fn complete_pending(&mut self, wait: bool) -> bool {
        self.inner.complete_pending(wait)
    }
}
