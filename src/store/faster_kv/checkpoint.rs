use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use uuid::Uuid;

use crate::checkpoint::{
    checkpoint_dir, create_checkpoint_directory, index_metadata_path, log_metadata_path,
    log_snapshot_path, read_snapshot, write_snapshot, CheckpointToken,
    HybridLogPersistenceCallback, IndexMetadata, IndexPersistenceCallback, LogMetadata,
    SnapshotRecord,
};
use crate::error::StoreError;
use crate::gen_lock::GenLock;
use crate::index::KeyHash;
use crate::record::Key;
use crate::status::Status;
use crate::value::VALUE_HEADER_SIZE;

use super::{FasterKv, FasterKvConfig};

impl FasterKv {
    /// Start a checkpoint of the whole store.
    ///
    /// The checkpoint is fuzzy: it runs on a background thread while
    /// sessions keep operating, capturing the newest record of every key as
    /// it is visited. `index_callback` fires once the index metadata is
    /// durable and `log_callback` once the record snapshot is; either may
    /// run before this call returns.
    ///
    /// Fails with `Status::Aborted` while another checkpoint is running.
    pub fn checkpoint(
        self: &Arc<Self>,
        index_callback: IndexPersistenceCallback,
        log_callback: HybridLogPersistenceCallback,
    ) -> Result<CheckpointToken, Status> {
        self.checkpoint_with_token(Uuid::new_v4(), index_callback, log_callback)
    }

    /// Start a checkpoint under a caller-chosen token.
    pub fn checkpoint_with_token(
        self: &Arc<Self>,
        token: CheckpointToken,
        index_callback: IndexPersistenceCallback,
        log_callback: HybridLogPersistenceCallback,
    ) -> Result<CheckpointToken, Status> {
        if self
            .checkpoint_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Status::Aborted);
        }

        let version = self.checkpoint_version.fetch_add(1, Ordering::AcqRel);
        let store = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("mlkv-checkpoint-{version}"))
            .spawn(move || {
                store.run_checkpoint(token, version, index_callback, log_callback);
                store.checkpoint_in_progress.store(false, Ordering::Release);
            });

        match spawned {
            Ok(_) => {
                if tracing::enabled!(tracing::Level::INFO) {
                    tracing::info!(token = %token, version, "checkpoint started");
                }
                Ok(token)
            }
            Err(_) => {
                self.checkpoint_in_progress.store(false, Ordering::Release);
                Err(Status::IoError)
            }
        }
    }

    /// Whether a checkpoint is running.
    pub fn is_checkpoint_in_progress(&self) -> bool {
        self.checkpoint_in_progress.load(Ordering::Acquire)
    }

    fn run_checkpoint(
        &self,
        token: CheckpointToken,
        version: u32,
        index_callback: IndexPersistenceCallback,
        log_callback: HybridLogPersistenceCallback,
    ) {
        let dir = match create_checkpoint_directory(&self.storage_dir, token) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!(token = %token, error = %e, "checkpoint directory creation failed");
                index_callback(Status::IoError);
                log_callback(Status::IoError, 0);
                return;
            }
        };

        let index_status = match self.write_index_metadata(&dir, token, version) {
            Ok(()) => Status::Ok,
            Err(e) => {
                tracing::warn!(token = %token, error = %e, "index checkpoint failed");
                Status::IoError
            }
        };
        index_callback(index_status);

        match self.write_log_snapshot(&dir, token, version) {
            Ok(meta) => {
                if tracing::enabled!(tracing::Level::INFO) {
                    tracing::info!(
                        token = %token,
                        records = meta.num_records,
                        sessions = meta.num_threads,
                        "checkpoint persisted"
                    );
                }
                log_callback(Status::Ok, meta.final_address);
            }
            Err(e) => {
                tracing::warn!(token = %token, error = %e, "log checkpoint failed");
                log_callback(Status::IoError, 0);
            }
        }
    }

    fn write_index_metadata(&self, dir: &std::path::Path, token: CheckpointToken, version: u32) -> io::Result<()> {
        let stats = self.hash_index.stats();
        let mut meta = IndexMetadata::with_token(token);
        meta.version = version;
        meta.table_size = stats.table_size;
        meta.num_entries = stats.used_buckets;
        meta.log_begin_address = self.hlog.begin_address().control();
        meta.checkpoint_start_address = self.hlog.tail_address().control();
        meta.write_to_file(&index_metadata_path(dir))
    }

    fn write_log_snapshot(
        &self,
        dir: &std::path::Path,
        token: CheckpointToken,
        version: u32,
    ) -> io::Result<LogMetadata> {
        let mut meta = LogMetadata::with_token(token);
        meta.version = version;
        for state in self.session_states() {
            meta.add_session(state.guid, state.serial_num);
        }
        meta.begin_address = self.hlog.begin_address().control();

        let records = self.collect_snapshot();
        meta.final_address = self.hlog.tail_address().control();
        meta.num_records = records.len() as u64;

        write_snapshot(&log_snapshot_path(dir), &records)?;
        // The metadata goes last: its presence marks the checkpoint complete.
        meta.write_to_file(&log_metadata_path(dir))?;
        Ok(meta)
    }

    /// Newest live record of every key, visited bucket by bucket.
    fn collect_snapshot(&self) -> Vec<SnapshotRecord> {
        let begin = self.hlog.begin_address();
        let mut records = Vec::new();
        let mut seen = HashSet::new();

        for head in self.hash_index.heads() {
            seen.clear();
            let mut address = head;
            while address.is_valid() && address >= begin {
                let Some(record) = self.hlog.get(address) else {
                    break;
                };
                address = record.info().previous_address();
                if record.info().is_invalid() || !seen.insert(record.key()) {
                    continue;
                }
                if record.info().is_tombstone() {
                    continue;
                }
                let mut payload = Vec::new();
                let lock = record.value().copy_atomic_to(&mut payload);
                records.push(SnapshotRecord {
                    key: record.key().0,
                    staleness: lock.staleness(),
                    payload,
                });
            }
        }
        records
    }

    /// Rebuild a store from the checkpoint named `token` under `storage_dir`.
    ///
    /// Restored sessions are listed by [`FasterKv::recovered_sessions`] until
    /// continued.
    pub fn recover(
        config: FasterKvConfig,
        storage_dir: impl Into<PathBuf>,
        token: &str,
    ) -> Result<Arc<Self>, StoreError> {
        let storage_dir = storage_dir.into();
        let token: CheckpointToken = token
            .trim()
            .parse()
            .map_err(|_| StoreError::InvalidToken(token.to_string()))?;

        let dir = checkpoint_dir(&storage_dir, token);
        let read_err = |e: io::Error| match e.kind() {
            io::ErrorKind::NotFound => StoreError::CheckpointNotFound(token.to_string()),
            io::ErrorKind::InvalidData => StoreError::Corrupt(e.to_string()),
            _ => StoreError::Io(e),
        };
        let index_meta = IndexMetadata::read_from_file(&index_metadata_path(&dir)).map_err(read_err)?;
        let log_meta = LogMetadata::read_from_file(&log_metadata_path(&dir)).map_err(read_err)?;
        if index_meta.token != token || log_meta.token != token {
            return Err(StoreError::Corrupt(format!("checkpoint {token} metadata names another token")));
        }
        let records = read_snapshot(&log_snapshot_path(&dir)).map_err(read_err)?;
        if records.len() as u64 != log_meta.num_records {
            return Err(StoreError::Corrupt(format!(
                "snapshot holds {} records, metadata expects {}",
                records.len(),
                log_meta.num_records
            )));
        }

        let store = Arc::new(Self::new(config, storage_dir)?);
        for record in &records {
            store.restore_record(record)?;
        }
        store
            .checkpoint_version
            .store(log_meta.version.wrapping_add(1), Ordering::Release);
        {
            let mut recovered = store.recovered_sessions.lock();
            for session in &log_meta.session_states {
                recovered.insert(session.guid, session.serial_num);
            }
        }

        if tracing::enabled!(tracing::Level::INFO) {
            tracing::info!(
                token = %token,
                records = records.len(),
                sessions = log_meta.session_states.len(),
                "store recovered"
            );
        }
        Ok(store)
    }

    /// Append a snapshot record as the newest version of its key.
    fn restore_record(&self, snapshot: &SnapshotRecord) -> Result<(), Status> {
        let key = Key(snapshot.key);
        let hash = KeyHash::new(key.hash());
        loop {
            let head = self.hash_index.head(hash);
            let (address, record) = self.reserve(key, VALUE_HEADER_SIZE + snapshot.payload.len())?;
            record
                .value()
                .init(GenLock::pack(snapshot.staleness, 0, false, false), &snapshot.payload);
            if self.publish(hash, head, address, record, false) {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointProgress;
    use crate::contexts::{SimpleReadContext, SimpleUpsertContext};
    use crate::store::FasterKvConfig;

    fn config() -> FasterKvConfig {
        FasterKvConfig::new(256, 1 << 20)
    }

    fn wait(progress: &CheckpointProgress) {
        while !progress.is_complete() {
            thread::yield_now();
        }
    }

    #[test]
    fn test_checkpoint_and_recover() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FasterKv::new(config(), dir.path()).unwrap());
        for key in 0..100u64 {
            let mut ctx = SimpleUpsertContext::new(Key(key), key.to_le_bytes().to_vec());
            store.internal_upsert(&mut ctx);
        }

        let progress = CheckpointProgress::new(Uuid::new_v4());
        let token = store
            .checkpoint_with_token(progress.token(), progress.index_callback(), progress.log_callback())
            .unwrap();
        assert_eq!(token, progress.token());
        wait(&progress);
        assert_eq!(progress.status(), Status::Ok);
        assert_eq!(progress.final_address(), store.hlog().tail_address().control());

        let recovered = FasterKv::recover(config(), dir.path(), &token.to_string()).unwrap();
        for key in 0..100u64 {
            let mut ctx = SimpleReadContext::new(Key(key));
            assert_eq!(recovered.internal_read(&mut ctx, true), Status::Ok);
            assert_eq!(ctx.into_value(), key.to_le_bytes());
        }
    }

    #[test]
    fn test_recover_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FasterKv::recover(config(), dir.path(), "not-a-uuid"),
            Err(StoreError::InvalidToken(_))
        ));
        assert!(matches!(
            FasterKv::recover(config(), dir.path(), &Uuid::new_v4().to_string()),
            Err(StoreError::CheckpointNotFound(_))
        ));
    }
}
