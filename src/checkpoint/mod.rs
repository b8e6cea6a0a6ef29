//! Checkpoint and recovery
//!
//! This module provides checkpoint metadata, progress tracking and the
//! on-disk checkpoint layout.

mod serialization;
mod state;

pub use serialization::{
    checkpoint_dir, checkpoint_exists, checkpoints_root, create_checkpoint_directory,
    index_metadata_path, list_checkpoints, log_metadata_path, log_snapshot_path, read_snapshot,
    write_snapshot,
};
pub use state::{CheckpointProgress, IndexMetadata, LogMetadata, SessionState, SnapshotRecord};

use uuid::Uuid;

/// Token identifying a checkpoint
pub type CheckpointToken = Uuid;

/// Callback for index persistence completion
pub type IndexPersistenceCallback = Box<dyn FnOnce(crate::Status) + Send + 'static>;

/// Callback for hybrid log persistence completion, with the final log address
pub type HybridLogPersistenceCallback = Box<dyn FnOnce(crate::Status, u64) + Send + 'static>;
