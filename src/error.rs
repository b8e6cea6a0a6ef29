//! Errors returned by store lifecycle operations.
//!
//! Per-operation outcomes are reported as [`Status`]; this type covers
//! opening, checkpointing and recovering a store.

use std::io;

use crate::config::ConfigError;
use crate::status::Status;

/// Store lifecycle error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error on the storage directory.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The checkpoint token is not a valid UUID.
    #[error("invalid checkpoint token: {0}")]
    InvalidToken(String),
    /// No complete checkpoint exists for the token.
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),
    /// Checkpoint files exist but cannot be decoded.
    #[error("corrupt checkpoint: {0}")]
    Corrupt(String),
    /// Invalid store parameters.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The store reported a failure status.
    #[error("operation failed with status {0}")]
    Status(Status),
}

impl StoreError {
    /// Map the error to the closest status code.
    pub fn status(&self) -> Status {
        match self {
            StoreError::Io(_) => Status::IoError,
            StoreError::InvalidToken(_) | StoreError::Config(_) => Status::InvalidArgument,
            StoreError::CheckpointNotFound(_) => Status::NotFound,
            StoreError::Corrupt(_) => Status::Corruption,
            StoreError::Status(status) => *status,
        }
    }
}

impl From<Status> for StoreError {
    fn from(status: Status) -> Self {
        StoreError::Status(status)
    }
}
