//! Checkpoint a populated store and recover it
//!
//! Run: cargo run --example checkpoint_recover

use std::thread;

use mlkv::{MlkvStore, Status};
use tempfile::tempdir;

const TABLE_SIZE: u64 = 1 << 16;
const LOG_SIZE: u64 = 1 << 28;
const NUM_THREADS: u64 = 4;
const KEYS_PER_THREAD: u64 = 10_000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let store = MlkvStore::open(TABLE_SIZE, LOG_SIZE, dir.path())?;

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|thread_id| {
            let store = store.clone();
            thread::spawn(move || {
                store.start_session();
                for i in 0..KEYS_PER_THREAD {
                    let key = thread_id * KEYS_PER_THREAD + i;
                    assert_eq!(store.upsert(key, &(key + 1000).to_le_bytes()), Status::Ok);
                }
                store.stop_session();
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker panicked");
    }
    for _ in 0..10 {
        store.mlkv_read(0, 8).map_err(|s| format!("{s:?}"))?;
    }

    let token = store.checkpoint()?;
    println!("checkpoint {token} persisted");
    drop(store);

    let recovered = MlkvStore::recover(TABLE_SIZE, LOG_SIZE, dir.path(), &token.to_string())?;
    println!("recovered from {token}");
    for key in 0..5u64 {
        let value = recovered.read_u64(key).map_err(|s| format!("{s:?}"))?;
        println!("  key={key}, value={value}, staleness={:?}", recovered.staleness(key));
    }

    recovered.clean_storage()?;
    Ok(())
}
