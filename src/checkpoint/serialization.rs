//! Checkpoint files
//!
//! Metadata is written as pretty JSON so checkpoints can be inspected by
//! hand; the record snapshot is a bincode stream.
//!
//! ```text
//! <storage>/checkpoints/<token>/index.meta
//! <storage>/checkpoints/<token>/log.meta
//! <storage>/checkpoints/<token>/log.snapshot
//! ```

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::checkpoint::{CheckpointToken, IndexMetadata, LogMetadata, SnapshotRecord};

fn invalid_data<E>(e: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, e)
}

fn write_json<T: serde::Serialize>(value: &T, path: &Path) -> io::Result<()> {
    let data = serde_json::to_vec_pretty(value).map_err(invalid_data)?;
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(&data)?;
    file.flush()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<T> {
    let mut file = BufReader::new(File::open(path)?);
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    serde_json::from_slice(&data).map_err(invalid_data)
}

impl IndexMetadata {
    /// Write to file (JSON format)
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        write_json(self, path)
    }

    /// Read from file (JSON format)
    pub fn read_from_file(path: &Path) -> io::Result<Self> {
        read_json(path)
    }
}

impl LogMetadata {
    /// Write to file (JSON format)
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        write_json(self, path)
    }

    /// Read from file (JSON format)
    pub fn read_from_file(path: &Path) -> io::Result<Self> {
        read_json(path)
    }
}

/// Write snapshot records (bincode).
pub fn write_snapshot(path: &Path, records: &[SnapshotRecord]) -> io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut file, records).map_err(invalid_data)?;
    file.flush()
}

/// Read snapshot records (bincode).
pub fn read_snapshot(path: &Path) -> io::Result<Vec<SnapshotRecord>> {
    let file = BufReader::new(File::open(path)?);
    bincode::deserialize_from(file).map_err(invalid_data)
}

/// Directory that holds every checkpoint of a store.
pub fn checkpoints_root(storage_dir: &Path) -> PathBuf {
    storage_dir.join("checkpoints")
}

/// Directory of one checkpoint.
pub fn checkpoint_dir(storage_dir: &Path, token: CheckpointToken) -> PathBuf {
    checkpoints_root(storage_dir).join(token.to_string())
}

/// Create checkpoint directory structure
pub fn create_checkpoint_directory(storage_dir: &Path, token: CheckpointToken) -> io::Result<PathBuf> {
    let dir = checkpoint_dir(storage_dir, token);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Get the index metadata file path
pub fn index_metadata_path(checkpoint_dir: &Path) -> PathBuf {
    checkpoint_dir.join("index.meta")
}

/// Get the log metadata file path
pub fn log_metadata_path(checkpoint_dir: &Path) -> PathBuf {
    checkpoint_dir.join("log.meta")
}

/// Get the log snapshot file path
pub fn log_snapshot_path(checkpoint_dir: &Path) -> PathBuf {
    checkpoint_dir.join("log.snapshot")
}

/// Whether a complete checkpoint exists for `token`.
pub fn checkpoint_exists(storage_dir: &Path, token: CheckpointToken) -> bool {
    let dir = checkpoint_dir(storage_dir, token);
    index_metadata_path(&dir).is_file()
        && log_metadata_path(&dir).is_file()
        && log_snapshot_path(&dir).is_file()
}

/// Tokens of every complete checkpoint, oldest first.
pub fn list_checkpoints(storage_dir: &Path) -> io::Result<Vec<CheckpointToken>> {
    let root = checkpoints_root(storage_dir);
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(&root)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let Ok(token) = name.parse::<CheckpointToken>() else {
            continue;
        };
        if !checkpoint_exists(storage_dir, token) {
            continue;
        }
        let timestamp = LogMetadata::read_from_file(&log_metadata_path(&entry.path()))
            .map(|m| m.timestamp)
            .unwrap_or(0);
        found.push((timestamp, token));
    }
    found.sort();
    Ok(found.into_iter().map(|(_, token)| token).collect())
}
