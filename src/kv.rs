//! Key-value facade with staleness-bounded operations.
//!
//! [`MlkvStore`] issues each call through the calling thread's session:
//! the one opened by [`MlkvStore::start_session`], or a session opened for
//! the single call and stopped afterwards. Operations that go pending are
//! drained before the call returns, so every method is synchronous.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use uuid::Uuid;

use crate::checkpoint::{list_checkpoints, CheckpointProgress, CheckpointToken};
use crate::config::MlkvConfig;
use crate::contexts::{
    IncrementContext, MlkvLookaheadContext, MlkvReadContext, MlkvUpsertContext, SimpleDeleteContext,
    SimpleReadContext, SimpleUpsertContext, StalenessPolicy,
};
use crate::error::StoreError;
use crate::record::Key;
use crate::stats::StatsSnapshot;
use crate::status::Status;
use crate::store::{CompactionResult, FasterKv, FasterKvConfig, Session};

/// Completion handed to a session operation.
type Completion<C> = Box<dyn FnOnce(C, Status) + Send + 'static>;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// Sessions started by this thread, by store id.
    static SESSIONS: RefCell<HashMap<u64, Session>> = RefCell::new(HashMap::new());
}

/// Key-value store with staleness-bounded reads and writes.
///
/// Cloning is cheap and clones share both the store and the per-thread
/// sessions.
#[derive(Clone)]
pub struct MlkvStore {
    id: u64,
    store: Arc<FasterKv>,
    policy: StalenessPolicy,
}

impl MlkvStore {
    /// Open an empty store persisting checkpoints under `path`.
    pub fn open(table_size: u64, log_size: u64, path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(FasterKvConfig::new(table_size, log_size), StalenessPolicy::default(), path)
    }

    /// Open an empty store from a loaded configuration.
    pub fn open_with_config(config: &MlkvConfig) -> Result<Self, StoreError> {
        let path = config.storage_path()?;
        Self::open_with(config.to_faster_kv_config(), config.to_staleness_policy()?, path)
    }

    fn open_with(config: FasterKvConfig, policy: StalenessPolicy, path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        fs::create_dir_all(path)?;
        let store = Arc::new(FasterKv::new(config, path)?);
        if tracing::enabled!(tracing::Level::INFO) {
            tracing::info!(
                path = %path.display(),
                table_size = store.config().table_size,
                log_memory_size = store.config().log_memory_size,
                "store opened"
            );
        }
        Ok(Self::wrap(store, policy))
    }

    /// Recover the store checkpointed under `path` as `token`.
    ///
    /// Sessions saved with the checkpoint are continued and stopped again,
    /// so the recovered store starts with no active session.
    pub fn recover(
        table_size: u64,
        log_size: u64,
        path: impl AsRef<Path>,
        token: &str,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let store = FasterKv::recover(FasterKvConfig::new(table_size, log_size), path, token)
            .inspect_err(|e| tracing::warn!(path = %path.display(), token, error = %e, "recovery failed"))?;
        for state in store.recovered_sessions() {
            if let Some(session) = store.continue_session(state.guid) {
                session.stop();
            }
        }
        Ok(Self::wrap(store, StalenessPolicy::default()))
    }

    fn wrap(store: Arc<FasterKv>, policy: StalenessPolicy) -> Self {
        Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            store,
            policy,
        }
    }

    /// The underlying store
    pub fn inner(&self) -> &Arc<FasterKv> {
        &self.store
    }

    /// Staleness policy of the MLKV operations
    pub fn policy(&self) -> &StalenessPolicy {
        &self.policy
    }

    /// Storage directory
    pub fn storage_path(&self) -> &Path {
        self.store.storage_dir()
    }

    // ============ Sessions ============

    /// Start a session for the calling thread. No-op if one is active.
    pub fn start_session(&self) {
        SESSIONS.with(|sessions| {
            sessions
                .borrow_mut()
                .entry(self.id)
                .or_insert_with(|| self.store.start_session());
        });
    }

    /// Stop the calling thread's session, completing its pending operations.
    pub fn stop_session(&self) {
        let session = SESSIONS.with(|sessions| sessions.borrow_mut().remove(&self.id));
        if let Some(session) = session {
            session.stop();
        }
    }

    /// Complete pending operations of the calling thread's session.
    ///
    /// Returns whether nothing is left pending.
    pub fn complete_pending(&self, wait: bool) -> bool {
        SESSIONS.with(|sessions| {
            sessions
                .borrow_mut()
                .get_mut(&self.id)
                .map_or(true, |session| session.complete_pending(wait))
        })
    }

    fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let session = SESSIONS.with(|sessions| sessions.borrow_mut().remove(&self.id));
        match session {
            Some(mut session) => {
                let result = f(&mut session);
                SESSIONS.with(|sessions| sessions.borrow_mut().insert(self.id, session));
                result
            }
            None => {
                let mut session = self.store.start_session();
                let result = f(&mut session);
                session.stop();
                result
            }
        }
    }

    /// Issue one operation and wait for its completion.
    fn issue<C, F>(&self, mut ctx: C, op: F) -> (C, Status)
    where
        C: Send + 'static,
        F: FnOnce(&mut Session, &mut C, Completion<C>) -> Status,
    {
        let (tx, rx) = crossbeam::channel::bounded(1);
        let completion: Completion<C> = Box::new(move |ctx, status| {
            let _ = tx.send((ctx, status));
        });
        let status = self.with_session(|session| {
            let status = op(session, &mut ctx, completion);
            if status.is_pending() {
                session.complete_pending(true);
            }
            status
        });
        if !status.is_pending() {
            return (ctx, status);
        }
        match rx.try_recv() {
            Ok(done) => done,
            Err(_) => {
                tracing::error!(store = self.id, "pending operation drained without completing");
                (ctx, Status::Aborted)
            }
        }
    }

    // ============ Operations ============

    /// Insert or overwrite `key`.
    pub fn upsert(&self, key: u64, value: &[u8]) -> Status {
        let ctx = SimpleUpsertContext::new(Key(key), value.to_vec());
        self.issue(ctx, |session, ctx, done| session.upsert(ctx, done)).1
    }

    /// Read `key`.
    pub fn read(&self, key: u64) -> Result<Vec<u8>, Status> {
        let ctx = SimpleReadContext::new(Key(key));
        match self.issue(ctx, |session, ctx, done| session.read(ctx, done)) {
            (ctx, Status::Ok) => Ok(ctx.into_value()),
            (_, status) => Err(status),
        }
    }

    /// Add the little-endian `u64` counters in `increments` to the value of
    /// `key`.
    ///
    /// # Panics
    /// If `key` does not exist.
    pub fn rmw(&self, key: u64, increments: &[u8]) -> Status {
        let ctx = IncrementContext::new(Key(key), increments.to_vec());
        self.issue(ctx, |session, ctx, done| session.rmw(ctx, done)).1
    }

    /// Add `increment` to the single counter stored under `key`.
    ///
    /// # Panics
    /// If `key` does not exist.
    pub fn rmw_u64(&self, key: u64, increment: u64) -> Status {
        let ctx = IncrementContext::from_u64(Key(key), increment);
        self.issue(ctx, |session, ctx, done| session.rmw(ctx, done)).1
    }

    /// Read the single counter stored under `key`.
    pub fn read_u64(&self, key: u64) -> Result<u64, Status> {
        let value = self.read(key)?;
        if value.len() < 8 {
            return Err(Status::Corruption);
        }
        Ok(u64::from_le(bytemuck::pod_read_unaligned(&value[..8])))
    }

    /// Delete `key`.
    pub fn delete(&self, key: u64) -> Status {
        let ctx = SimpleDeleteContext::new(Key(key));
        self.issue(ctx, |session, ctx, done| session.delete(ctx, done)).1
    }

    /// Read `key`, raising its staleness.
    ///
    /// Returns `Err(Status::NotFound)` without creating anything when the
    /// key is absent. Any other failure status is returned as is.
    pub fn mlkv_read(&self, key: u64, expected_len: usize) -> Result<Vec<u8>, Status> {
        let ctx = MlkvReadContext::with_policy(Key(key), expected_len, &self.policy);
        match self.issue(ctx, |session, ctx, done| session.rmw(ctx, done)) {
            (ctx, Status::Ok) if ctx.found() => Ok(ctx.into_value()),
            (_, Status::Ok | Status::NotFound) => Err(Status::NotFound),
            (_, status) => Err(status),
        }
    }

    /// Overwrite `key`, lowering its staleness.
    ///
    /// Returns `Status::NotFound` when the key is absent.
    pub fn mlkv_upsert(&self, key: u64, value: &[u8]) -> Status {
        let ctx = MlkvUpsertContext::with_policy(Key(key), value.to_vec(), &self.policy);
        self.issue(ctx, |session, ctx, done| session.rmw(ctx, done)).1
    }

    /// Carry the record of `key` forward unchanged if it is no longer
    /// mutable in place.
    ///
    /// # Panics
    /// If `key` does not exist.
    pub fn mlkv_lookahead(&self, key: u64, len: usize) -> Status {
        let ctx = MlkvLookaheadContext::new(Key(key), len);
        self.issue(ctx, |session, ctx, done| session.rmw(ctx, done)).1
    }

    /// Staleness counter of the live record of `key`.
    pub fn staleness(&self, key: u64) -> Option<i32> {
        self.store.staleness(Key(key))
    }

    // ============ Maintenance ============

    /// Checkpoint the store and wait until it is durable.
    ///
    /// The returned token, as a string, is accepted by [`MlkvStore::recover`].
    pub fn checkpoint(&self) -> Result<CheckpointToken, StoreError> {
        let progress = CheckpointProgress::new(Uuid::new_v4());
        let token = self.store.checkpoint_with_token(
            progress.token(),
            progress.index_callback(),
            progress.log_callback(),
        )?;

        while !progress.index_persisted() {
            self.complete_pending(false);
            thread::yield_now();
        }
        while !progress.log_persisted() {
            self.complete_pending(false);
            thread::yield_now();
        }
        self.complete_pending(true);

        match progress.status() {
            Status::Ok => Ok(token),
            status => Err(StoreError::Status(status)),
        }
    }

    /// Tokens of the complete checkpoints under the storage directory,
    /// oldest first.
    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointToken>, StoreError> {
        Ok(list_checkpoints(self.store.storage_dir())?)
    }

    /// Move every live immutable record to the tail and drop the rest of the
    /// immutable log.
    pub fn compact(&self) -> CompactionResult {
        let until = self.store.hlog().read_only_address();
        self.store
            .compact(until, |key, value| MlkvLookaheadContext::new(key, value.length()))
    }

    /// Operation counters
    pub fn stats(&self) -> StatsSnapshot {
        self.store.stats_snapshot()
    }

    /// Remove the storage directory and everything in it.
    pub fn clean_storage(&self) -> Result<(), StoreError> {
        remove_dir(self.store.storage_dir())
    }
}

fn remove_dir(path: &Path) -> Result<(), StoreError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::Io(e)),
    }
}

impl std::fmt::Debug for MlkvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlkvStore")
            .field("id", &self.id)
            .field("storage_dir", &self.store.storage_dir())
            .field("policy", &self.policy)
            .finish()
    }
}
