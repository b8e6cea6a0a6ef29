//! Single-threaded tour of the store
//!
//! Upserts, increments, reads and deletes a thousand counters, then shows
//! how bounded reads and upserts move a key's staleness.
//!
//! Run: cargo run --example single_thread

use mlkv::{MlkvStore, Status};
use tempfile::tempdir;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let store = MlkvStore::open(1 << 14, 1 << 26, dir.path())?;

    println!("--- upsert ---");
    for key in 0..1000u64 {
        assert_eq!(store.upsert(key, &(key + 1000).to_le_bytes()), Status::Ok);
    }

    println!("--- read-modify-write ---");
    for key in 0..1000u64 {
        assert_eq!(store.rmw_u64(key, 5), Status::Ok);
    }

    println!("--- read ---");
    for key in 0..1000u64 {
        let value = store.read_u64(key).map_err(|s| format!("read {key}: {s:?}"))?;
        assert_eq!(value, key + 1005);
        if key < 5 {
            println!("  key={key}, value={value}");
        }
    }

    println!("--- delete ---");
    for key in 0..1000u64 {
        assert_eq!(store.delete(key), Status::Ok);
    }
    for key in 0..1000u64 {
        assert_eq!(store.read(key), Err(Status::NotFound));
    }

    println!("--- staleness ---");
    let embedding = [0.5f32; 8];
    store.upsert(7, bytemuck::cast_slice(&embedding));
    for _ in 0..3 {
        store.mlkv_read(7, std::mem::size_of_val(&embedding)).map_err(|s| format!("{s:?}"))?;
    }
    println!("  after 3 bounded reads: {:?}", store.staleness(7));
    store.mlkv_upsert(7, bytemuck::cast_slice(&[0.25f32; 8]));
    println!("  after 1 bounded upsert: {:?}", store.staleness(7));

    println!("\n{}", store.stats());
    store.clean_storage()?;
    Ok(())
}
