//! mlkv - staleness-bounded record mutation over a FASTER-style key-value store
//!
//! Records live in an append-only hybrid log and are located through a hash
//! index. Each value slot carries a packed generation lock that lets threads
//! update it in place without torn reads, and a signed staleness counter
//! that bounds how far cheap in-place updates may drift:
//!
//! - **Generation lock**: [`gen_lock`] packs staleness, generation, locked
//!   and replaced into one atomic word.
//! - **Contexts**: [`contexts`] holds the plain read/upsert/delete/RMW
//!   contexts and the staleness-bounded MLKV read, upsert and lookahead.
//! - **Store**: [`store::FasterKv`] runs the contexts against the log, with
//!   sessions, pending completion, checkpoint, recovery and compaction.
//! - **Facade**: [`MlkvStore`] maps each call to a session operation and
//!   waits for it.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mlkv::{MlkvStore, Status};
//!
//! let store = MlkvStore::open(1 << 16, 1 << 26, "/tmp/mlkv-demo")?;
//! assert_eq!(store.upsert(1, &[0u8; 16]), Status::Ok);
//!
//! // Each bounded read raises the record's staleness by one.
//! let weights = store.mlkv_read(1, 16).expect("present");
//! assert_eq!(weights.len(), 16);
//! assert_eq!(store.staleness(1), Some(1));
//!
//! let token = store.checkpoint()?;
//! let recovered = MlkvStore::recover(1 << 16, 1 << 26, "/tmp/mlkv-demo", &token.to_string())?;
//! assert_eq!(recovered.read(1).unwrap(), vec![0u8; 16]);
//! # Ok::<(), mlkv::StoreError>(())
//! ```

#![warn(missing_docs)]

pub mod address;
pub mod allocator;
pub mod checkpoint;
pub mod config;
pub mod contexts;
pub mod error;
pub mod gen_lock;
pub mod index;
pub mod kv;
pub mod record;
pub mod stats;
pub mod status;
pub mod store;
pub mod value;
mod utility;

// Re-exports for convenience
pub use address::{Address, AtomicAddress};
pub use checkpoint::CheckpointToken;
pub use config::{ConfigError, MlkvConfig};
pub use error::StoreError;
pub use gen_lock::{AtomicGenLock, GenLock, LockOutcome};
pub use kv::MlkvStore;
pub use record::{Key, RecordInfo};
pub use status::{OperationType, Status};
pub use store::{FasterKv, FasterKvConfig};
pub use value::{Value, ValueGuard};

/// Utility for size literals (e.g., 1 GiB)
pub mod size {
    /// 1 KiB in bytes
    pub const KIB: u64 = 1024;
    /// 1 MiB in bytes
    pub const MIB: u64 = 1024 * KIB;
    /// 1 GiB in bytes
    pub const GIB: u64 = 1024 * MIB;
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::contexts::{
        MlkvLookaheadContext, MlkvReadContext, MlkvUpsertContext, StalenessPolicy,
    };
    pub use crate::gen_lock::{AtomicGenLock, GenLock};
    pub use crate::kv::MlkvStore;
    pub use crate::record::Key;
    pub use crate::status::Status;
    pub use crate::store::{
        DeleteContext, FasterKv, FasterKvConfig, ReadContext, RmwContext, Session, UpsertContext,
    };
}
