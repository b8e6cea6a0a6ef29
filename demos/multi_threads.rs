//! Multi-threaded upsert, increment, read and delete
//!
//! Each thread opens its own session and works on a disjoint key range.
//!
//! Run: cargo run --example multi_threads

use std::thread;

use mlkv::{MlkvStore, Status};
use tempfile::tempdir;

const NUM_THREADS: u64 = 8;
const KEYS_PER_THREAD: u64 = 1000;

fn run_parallel(store: &MlkvStore, op: fn(&MlkvStore, u64)) {
    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|thread_id| {
            let store = store.clone();
            thread::spawn(move || {
                store.start_session();
                for i in 0..KEYS_PER_THREAD {
                    op(&store, thread_id * KEYS_PER_THREAD + i);
                }
                store.stop_session();
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker panicked");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let store = MlkvStore::open(1 << 16, 1 << 28, dir.path())?;
    let total = NUM_THREADS * KEYS_PER_THREAD;

    run_parallel(&store, |store, key| {
        assert_eq!(store.upsert(key, &(key + 1000).to_le_bytes()), Status::Ok);
    });
    println!("upserted {total} keys on {NUM_THREADS} threads");

    run_parallel(&store, |store, key| {
        assert_eq!(store.rmw_u64(key, 5), Status::Ok);
    });
    println!("incremented {total} keys");

    for key in 0..total {
        assert_eq!(store.read_u64(key), Ok(key + 1005));
    }
    println!("verified {total} keys");

    run_parallel(&store, |store, key| {
        assert_eq!(store.delete(key), Status::Ok);
    });
    for key in 0..total {
        assert_eq!(store.read(key), Err(Status::NotFound));
    }
    println!("deleted {total} keys");

    println!("\n{}", store.stats());
    store.clean_storage()?;
    Ok(())
}
