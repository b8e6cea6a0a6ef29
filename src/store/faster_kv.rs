//! FasterKV - Core key-value store implementation
//!
//! Records are found through the hash index and live in the hybrid log.
//! Updates to records in the mutable region go through the contexts'
//! in-place hooks under each value's generation lock; every other update
//! appends a new record and swings the bucket's chain head to it.

mod checkpoint;
mod compaction;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::address::Address;
use crate::allocator::{HybridLog, HybridLogConfig, LogStats, DEFAULT_PAGE_BITS};
use crate::checkpoint::SessionState;
use crate::config::ConfigError;
use crate::index::{HashIndex, IndexConfig, IndexStats, KeyHash};
use crate::record::{Key, RecordInfo, RecordRef};
use crate::stats::{OperationStats, StatsSnapshot};
use crate::status::{OperationType, Status};
use crate::store::{DeleteContext, ReadContext, RmwContext, Session, UpsertContext};

pub use compaction::CompactionResult;

/// Configuration for FasterKV
#[derive(Debug, Clone)]
pub struct FasterKvConfig {
    /// Hash table size (rounded up to a power of 2)
    pub table_size: u64,
    /// Log memory size in bytes
    pub log_memory_size: u64,
    /// Log page size bits (page size = 1 << page_size_bits)
    pub page_size_bits: u32,
    /// Mutable fraction of log memory
    pub mutable_fraction: f64,
}

impl FasterKvConfig {
    /// Create a new configuration
    pub fn new(table_size: u64, log_memory_size: u64) -> Self {
        Self {
            table_size,
            log_memory_size,
            page_size_bits: DEFAULT_PAGE_BITS,
            mutable_fraction: 0.9,
        }
    }

    /// Reject parameters the store cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "store.table_size".into(),
                value: self.table_size.to_string(),
            });
        }
        if self.log_memory_size < 1 << 12 {
            return Err(ConfigError::InvalidValue {
                key: "store.log_memory_size".into(),
                value: self.log_memory_size.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.mutable_fraction) {
            return Err(ConfigError::InvalidValue {
                key: "store.mutable_fraction".into(),
                value: self.mutable_fraction.to_string(),
            });
        }
        Ok(())
    }

    fn log_config(&self) -> HybridLogConfig {
        HybridLogConfig {
            memory_size: self.log_memory_size,
            page_size_bits: self.page_size_bits,
            mutable_fraction: self.mutable_fraction,
        }
    }
}

impl Default for FasterKvConfig {
    fn default() -> Self {
        Self {
            table_size: 1 << 20,      // 1M buckets
            log_memory_size: 1 << 29, // 512 MB
            page_size_bits: DEFAULT_PAGE_BITS,
            mutable_fraction: 0.9,
        }
    }
}

/// FasterKV - concurrent key-value store
///
/// Coordinates:
/// - Hash index for key lookups
/// - Hybrid log for record storage
/// - Session registry for checkpoint persistence
/// - Checkpoint, recovery and compaction
pub struct FasterKv {
    config: FasterKvConfig,
    /// Hash index
    hash_index: HashIndex,
    /// Hybrid log
    hlog: HybridLog,
    /// Directory holding checkpoints
    storage_dir: PathBuf,
    /// Operation counters
    stats: OperationStats,
    /// Next session ID
    next_session_id: AtomicU32,
    /// Serial number of every active session, by GUID
    session_registry: RwLock<HashMap<Uuid, Arc<AtomicU64>>>,
    /// Sessions restored from a checkpoint and not yet continued
    recovered_sessions: Mutex<HashMap<Uuid, u64>>,
    /// Version of the next checkpoint
    checkpoint_version: AtomicU32,
    checkpoint_in_progress: AtomicBool,
    compaction_in_progress: AtomicBool,
}

impl FasterKv {
    /// Create a new, empty store persisting checkpoints under `storage_dir`.
    pub fn new(config: FasterKvConfig, storage_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        config.validate()?;
        let hash_index = HashIndex::new(&IndexConfig::new(config.table_size));
        let hlog = HybridLog::new(config.log_config());
        Ok(Self {
            config,
            hash_index,
            hlog,
            storage_dir: storage_dir.into(),
            stats: OperationStats::new(),
            next_session_id: AtomicU32::new(0),
            session_registry: RwLock::new(HashMap::new()),
            recovered_sessions: Mutex::new(HashMap::new()),
            checkpoint_version: AtomicU32::new(1),
            checkpoint_in_progress: AtomicBool::new(false),
            compaction_in_progress: AtomicBool::new(false),
        })
    }

    /// Store configuration
    pub fn config(&self) -> &FasterKvConfig {
        &self.config
    }

    /// Directory holding checkpoints
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// The hybrid log
    pub fn hlog(&self) -> &HybridLog {
        &self.hlog
    }

    /// Get index statistics
    pub fn index_stats(&self) -> IndexStats {
        self.hash_index.stats()
    }

    /// Get log statistics
    pub fn log_stats(&self) -> LogStats {
        self.hlog.stats()
    }

    /// Operation counters
    pub fn operation_stats(&self) -> &OperationStats {
        &self.stats
    }

    /// Snapshot of the operation counters
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    // ============ Session Management API ============

    /// Start a new session
    ///
    /// Sessions are not thread-safe and should only be used from the thread
    /// that created them. Each thread should have at most one active session.
    pub fn start_session(self: &Arc<Self>) -> Session {
        self.open_session(Uuid::new_v4(), 0)
    }

    /// Continue a session restored from a checkpoint.
    ///
    /// Returns `None` when `guid` is not a recovered session, or it was
    /// already continued.
    pub fn continue_session(self: &Arc<Self>, guid: Uuid) -> Option<Session> {
        let serial_num = self.recovered_sessions.lock().remove(&guid)?;
        Some(self.open_session(guid, serial_num))
    }

    fn open_session(self: &Arc<Self>, guid: Uuid, serial_num: u64) -> Session {
        let session_id = self.next_session_id.fetch_add(1, Ordering::AcqRel);
        let serial = Arc::new(AtomicU64::new(serial_num));
        self.session_registry
            .write()
            .insert(guid, Arc::clone(&serial));
        Session::new(Arc::clone(self), guid, session_id as usize, serial)
    }

    /// Unregister a session from the registry
    pub(crate) fn unregister_session(&self, guid: Uuid) {
        self.session_registry.write().remove(&guid);
    }

    /// Get all active session states (for checkpointing)
    pub fn session_states(&self) -> Vec<SessionState> {
        self.session_registry
            .read()
            .iter()
            .map(|(guid, serial)| SessionState::new(*guid, serial.load(Ordering::Acquire)))
            .collect()
    }

    /// Get the number of active sessions
    pub fn active_session_count(&self) -> usize {
        self.session_registry.read().len()
    }

    /// Sessions restored by recovery that have not been continued yet
    pub fn recovered_sessions(&self) -> Vec<SessionState> {
        self.recovered_sessions
            .lock()
            .iter()
            .map(|(guid, serial)| SessionState::new(*guid, *serial))
            .collect()
    }

    // ============ Record access ============

    /// Walk the hash chain starting at `address` to the newest record for `key`.
    fn find(&self, key: Key, mut address: Address) -> Option<(Address, RecordRef<'_>)> {
        let begin = self.hlog.begin_address();
        while address.is_valid() && address >= begin {
            let record = self.hlog.get(address)?;
            if !record.info().is_invalid() && record.key() == key {
                return Some((address, record));
            }
            address = record.info().previous_address();
        }
        None
    }

    /// Newest live record for `key`, if any.
    pub(crate) fn find_live(&self, key: Key) -> Option<(Address, RecordRef<'_>)> {
        let hash = KeyHash::new(key.hash());
        self.find(key, self.hash_index.head(hash))
            .filter(|(_, record)| !record.info().is_tombstone())
    }

    /// Reserve a record for `key`. The caller fills the value, then publishes.
    fn reserve(&self, key: Key, value_size: usize) -> Result<(Address, RecordRef<'_>), Status> {
        let (address, record) = self.hlog.allocate(value_size)?;
        // SAFETY: the record is not reachable by any other thread yet.
        unsafe { record.set_key(key) };
        Ok((address, record))
    }

    /// Link a filled record in front of `head`.
    ///
    /// Returns `false` if the chain head moved; the record is then withdrawn
    /// and the caller must retry against the new head.
    fn publish(
        &self,
        hash: KeyHash,
        head: Address,
        address: Address,
        record: RecordRef<'_>,
        tombstone: bool,
    ) -> bool {
        record.info().store(RecordInfo::pack(head, false, tombstone));
        match self.hash_index.try_update(hash, head, address) {
            Ok(()) => true,
            Err(_) => {
                record.info().set_invalid();
                self.stats.record_retry();
                false
            }
        }
    }

    // ============ Operations ============

    /// Read the newest value for the context's key.
    ///
    /// Returns `Status::Pending` for a cold record unless `from_pending` is
    /// set, in which case the cold record is read directly.
    pub(crate) fn internal_read<C: ReadContext>(&self, ctx: &mut C, from_pending: bool) -> Status {
        if !from_pending {
            self.stats.record(OperationType::Read);
        }
        let status = match self.find_live(ctx.key()) {
            None => Status::NotFound,
            Some((address, record)) => {
                if address < self.hlog.head_address() {
                    if !from_pending {
                        self.stats.record_pending();
                        return Status::Pending;
                    }
                    ctx.get(&record.value());
                } else {
                    ctx.get_atomic(&record.value());
                }
                Status::Ok
            }
        };
        self.stats.record_read_result(status.is_ok());
        status
    }

    /// Insert or overwrite the context's key.
    pub(crate) fn internal_upsert<C: UpsertContext>(&self, ctx: &mut C) -> Status {
        self.stats.record(OperationType::Upsert);
        let key = ctx.key();
        let hash = KeyHash::new(key.hash());

        loop {
            let head = self.hash_index.head(hash);
            if let Some((address, record)) = self.find(key, head) {
                if !record.info().is_tombstone() {
                    let value = record.value();
                    if address >= self.hlog.read_only_address() && ctx.put_atomic(&value) {
                        self.stats.record_in_place();
                        return Status::Ok;
                    }
                    if address >= self.hlog.head_address() {
                        value.gen_lock().seal();
                    }
                }
            }

            let (address, record) = match self.reserve(key, ctx.value_size()) {
                Ok(reserved) => reserved,
                Err(status) => return status,
            };
            ctx.put(&mut record.value());
            if self.publish(hash, head, address, record, false) {
                return Status::Ok;
            }
        }
    }

    /// Read-modify-write the context's key.
    ///
    /// In-place when the newest record is mutable and the context accepts;
    /// otherwise the old record is sealed and copied forward. Returns
    /// `Status::Pending` for a cold record unless `from_pending` is set.
    pub(crate) fn internal_rmw<C: RmwContext>(&self, ctx: &mut C, from_pending: bool) -> Status {
        if !from_pending {
            self.stats.record(OperationType::Rmw);
        }
        let key = ctx.key();
        let hash = KeyHash::new(key.hash());

        loop {
            let head = self.hash_index.head(hash);
            match self.find(key, head) {
                Some((address, record)) if !record.info().is_tombstone() => {
                    let old = record.value();
                    if address >= self.hlog.read_only_address() && ctx.rmw_atomic(&old) {
                        self.stats.record_in_place();
                        return Status::Ok;
                    }
                    if address < self.hlog.head_address() && !from_pending {
                        self.stats.record_pending();
                        return Status::Pending;
                    }

                    old.gen_lock().seal();
                    let (new_address, new_record) =
                        match self.reserve(key, ctx.value_size_from(&old)) {
                            Ok(reserved) => reserved,
                            Err(status) => return status,
                        };
                    ctx.rmw_copy(&old, &mut new_record.value());
                    if self.publish(hash, head, new_address, new_record, false) {
                        self.stats.record_copy();
                        if tracing::enabled!(tracing::Level::TRACE) {
                            tracing::trace!(key = %key, from = %address, to = %new_address, "rmw copy-forward");
                        }
                        return Status::Ok;
                    }
                }
                _ => {
                    if !ctx.create_if_absent() {
                        return Status::NotFound;
                    }
                    let (new_address, new_record) = match self.reserve(key, ctx.value_size()) {
                        Ok(reserved) => reserved,
                        Err(status) => return status,
                    };
                    if !ctx.rmw_initial(&mut new_record.value()) {
                        new_record.info().set_invalid();
                        return Status::NotFound;
                    }
                    if self.publish(hash, head, new_address, new_record, false) {
                        return Status::Ok;
                    }
                }
            }
        }
    }

    /// Delete the context's key by appending a tombstone.
    pub(crate) fn internal_delete<C: DeleteContext>(&self, ctx: &mut C) -> Status {
        self.stats.record(OperationType::Delete);
        let key = ctx.key();
        let hash = KeyHash::new(key.hash());

        loop {
            let head = self.hash_index.head(hash);
            let (address, record) = match self.find(key, head) {
                Some(found) if !found.1.info().is_tombstone() => found,
                _ => return Status::NotFound,
            };
            if address >= self.hlog.head_address() {
                record.value().gen_lock().seal();
            }

            let (new_address, new_record) = match self.reserve(key, ctx.value_size()) {
                Ok(reserved) => reserved,
                Err(status) => return status,
            };
            if self.publish(hash, head, new_address, new_record, true) {
                return Status::Ok;
            }
        }
    }

    /// Staleness counter of the newest live record for `key`.
    pub fn staleness(&self, key: Key) -> Option<i32> {
        self.find_live(key).map(|(_, record)| record.value().staleness())
    }
}
