//! Shared test utilities.

#![allow(dead_code)]

use std::sync::Arc;

use mlkv::store::{FasterKv, FasterKvConfig};
use mlkv::MlkvStore;
use tempfile::TempDir;

/// Small store configuration: 1 MB of log in 64 KB pages.
pub fn small_config() -> FasterKvConfig {
    FasterKvConfig {
        table_size: 1024,
        log_memory_size: 1 << 20,
        page_size_bits: 16,
        mutable_fraction: 0.9,
    }
}

/// Create an engine store over a fresh temporary directory.
pub fn create_store() -> (TempDir, Arc<FasterKv>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FasterKv::new(small_config(), dir.path()).expect("valid config");
    (dir, Arc::new(store))
}

/// Open a facade store over a fresh temporary directory.
pub fn open_store() -> (TempDir, MlkvStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MlkvStore::open(1024, 1 << 22, dir.path()).expect("open");
    (dir, store)
}

/// Make every record currently in the log cold.
pub fn evict_all(store: &FasterKv) {
    let tail = store.hlog().tail_address();
    store.hlog().shift_head_address(tail);
}

/// Make every record currently in the log immutable.
pub fn freeze_all(store: &FasterKv) {
    let tail = store.hlog().tail_address();
    store.hlog().shift_read_only_address(tail);
}
