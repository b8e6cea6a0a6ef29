//! Checkpoint state management
//!
//! This module provides checkpoint metadata and progress tracking.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkpoint::{CheckpointToken, HybridLogPersistenceCallback, IndexPersistenceCallback};
use crate::status::Status;

/// Index metadata for checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Checkpoint token
    pub token: CheckpointToken,
    /// Checkpoint version
    pub version: u32,
    /// Hash table size (number of buckets)
    pub table_size: u64,
    /// Buckets holding at least one record
    pub num_entries: u64,
    /// Earliest valid address in the log
    pub log_begin_address: u64,
    /// Tail address when the checkpoint started
    pub checkpoint_start_address: u64,
}

impl IndexMetadata {
    /// Create empty metadata for a checkpoint
    pub fn with_token(token: CheckpointToken) -> Self {
        Self {
            token,
            version: 0,
            table_size: 0,
            num_entries: 0,
            log_begin_address: 0,
            checkpoint_start_address: 0,
        }
    }
}

/// Session state for checkpoint persistence
///
/// Stores the state of a single session (thread) at checkpoint time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Session GUID
    pub guid: Uuid,
    /// Monotonic serial number for this session
    pub serial_num: u64,
}

impl SessionState {
    /// Create a new session state
    pub fn new(guid: Uuid, serial_num: u64) -> Self {
        Self { guid, serial_num }
    }
}

/// Log metadata for checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMetadata {
    /// Checkpoint token
    pub token: CheckpointToken,
    /// Checkpoint version
    pub version: u32,
    /// Number of sessions registered at checkpoint
    pub num_threads: u32,
    /// Begin address of the log
    pub begin_address: u64,
    /// Tail address once the snapshot was taken
    pub final_address: u64,
    /// Records written to the snapshot file
    pub num_records: u64,
    /// Session states at checkpoint
    pub session_states: Vec<SessionState>,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
}

impl LogMetadata {
    /// Create empty metadata for a checkpoint
    pub fn with_token(token: CheckpointToken) -> Self {
        Self {
            token,
            version: 0,
            num_threads: 0,
            begin_address: 0,
            final_address: 0,
            num_records: 0,
            session_states: Vec::new(),
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Add a session state
    pub fn add_session(&mut self, guid: Uuid, serial_num: u64) {
        self.session_states.push(SessionState::new(guid, serial_num));
        self.num_threads = self.session_states.len() as u32;
    }

    /// Get session state by GUID
    pub fn get_session(&self, guid: &Uuid) -> Option<&SessionState> {
        self.session_states.iter().find(|s| &s.guid == guid)
    }
}

/// One live record captured in a log snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Record key
    pub key: u64,
    /// Staleness counter at capture time
    pub staleness: i32,
    /// Payload bytes
    pub payload: Vec<u8>,
}

/// Progress of one checkpoint.
///
/// The store reports completion through two persistence callbacks; this
/// object turns them into flags the caller can poll.
#[derive(Debug)]
pub struct CheckpointProgress {
    token: CheckpointToken,
    index_persisted: AtomicBool,
    log_persisted: AtomicBool,
    /// First non-Ok status reported by either callback
    status: AtomicU8,
    final_address: AtomicU64,
}

impl CheckpointProgress {
    /// Track the checkpoint named `token`.
    pub fn new(token: CheckpointToken) -> Arc<Self> {
        Arc::new(Self {
            token,
            index_persisted: AtomicBool::new(false),
            log_persisted: AtomicBool::new(false),
            status: AtomicU8::new(Status::Ok as u8),
            final_address: AtomicU64::new(0),
        })
    }

    /// Checkpoint token
    pub fn token(&self) -> CheckpointToken {
        self.token
    }

    fn record_status(&self, status: Status) {
        if !status.is_ok() {
            let _ = self.status.compare_exchange(
                Status::Ok as u8,
                status as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    /// Callback that marks the index as persisted.
    pub fn index_callback(self: &Arc<Self>) -> IndexPersistenceCallback {
        let progress = Arc::clone(self);
        Box::new(move |status| {
            progress.record_status(status);
            progress.index_persisted.store(true, Ordering::Release);
        })
    }

    /// Callback that marks the log as persisted.
    pub fn log_callback(self: &Arc<Self>) -> HybridLogPersistenceCallback {
        let progress = Arc::clone(self);
        Box::new(move |status, final_address| {
            progress.record_status(status);
            progress.final_address.store(final_address, Ordering::Release);
            progress.log_persisted.store(true, Ordering::Release);
        })
    }

    /// Whether the index callback has fired.
    pub fn index_persisted(&self) -> bool {
        self.index_persisted.load(Ordering::Acquire)
    }

    /// Whether the log callback has fired.
    pub fn log_persisted(&self) -> bool {
        self.log_persisted.load(Ordering::Acquire)
    }

    /// Whether both callbacks have fired.
    pub fn is_complete(&self) -> bool {
        self.index_persisted() && self.log_persisted()
    }

    /// `Ok`, or the first failure either callback reported.
    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire)).unwrap_or(Status::Corruption)
    }

    /// Log address the checkpoint covers, once the log callback has fired.
    pub fn final_address(&self) -> u64 {
        self.final_address.load(Ordering::Acquire)
    }
}
