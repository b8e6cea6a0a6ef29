//! Basic operation tests through the `MlkvStore` facade.

mod common;

use mlkv::Status;

use common::open_store;

#[test]
fn test_basic_upsert_read() {
    let (_dir, store) = open_store();

    assert_eq!(store.upsert(42, b"hello"), Status::Ok);
    assert_eq!(store.read(42).unwrap(), b"hello");
}

#[test]
fn test_read_nonexistent() {
    let (_dir, store) = open_store();
    assert_eq!(store.read(999), Err(Status::NotFound));
}

#[test]
fn test_update_existing() {
    let (_dir, store) = open_store();

    store.upsert(42, b"first");
    store.upsert(42, b"2nd");
    assert_eq!(store.read(42).unwrap(), b"2nd");

    // Growing the value relocates the record.
    store.upsert(42, &[9u8; 256]);
    assert_eq!(store.read(42).unwrap(), vec![9u8; 256]);
}

#[test]
fn test_empty_value() {
    let (_dir, store) = open_store();
    store.upsert(1, b"");
    assert_eq!(store.read(1).unwrap(), Vec::<u8>::new());
}

#[test]
fn test_delete() {
    let (_dir, store) = open_store();

    store.upsert(5, b"five");
    assert_eq!(store.delete(5), Status::Ok);
    assert_eq!(store.read(5), Err(Status::NotFound));
    assert_eq!(store.delete(5), Status::NotFound);
    assert_eq!(store.delete(6), Status::NotFound);

    store.upsert(5, b"again");
    assert_eq!(store.read(5).unwrap(), b"again");
}

#[test]
fn test_upsert_rmw_read_delete_cycle() {
    let (_dir, store) = open_store();

    for key in 0..1000u64 {
        assert_eq!(store.upsert(key, &(key + 1000).to_le_bytes()), Status::Ok);
    }
    for key in 0..1000u64 {
        assert_eq!(store.rmw_u64(key, 5), Status::Ok);
    }
    for key in 0..1000u64 {
        assert_eq!(store.read_u64(key), Ok(key + 1005));
    }
    for key in 0..1000u64 {
        assert_eq!(store.delete(key), Status::Ok);
    }
    for key in 0..1000u64 {
        assert_eq!(store.read(key), Err(Status::NotFound));
    }
}

#[test]
fn test_rmw_multiple_counters() {
    let (_dir, store) = open_store();
    let counters: Vec<u8> = [1u64, 2, 3].iter().flat_map(|c| c.to_le_bytes()).collect();
    store.upsert(1, &counters);

    let increments: Vec<u8> = [10u64, 10].iter().flat_map(|c| c.to_le_bytes()).collect();
    assert_eq!(store.rmw(1, &increments), Status::Ok);

    let expected: Vec<u8> = [11u64, 12, 3].iter().flat_map(|c| c.to_le_bytes()).collect();
    assert_eq!(store.read(1).unwrap(), expected);
}

#[test]
#[should_panic(expected = "increment of absent key")]
fn test_rmw_absent_key_panics() {
    let (_dir, store) = open_store();
    store.rmw_u64(404, 1);
}

#[test]
fn test_stats_count_operations() {
    let (_dir, store) = open_store();
    store.upsert(1, b"a");
    store.upsert(1, b"b");
    let _ = store.read(1);
    let _ = store.read(2);
    store.delete(1);

    let stats = store.stats();
    assert_eq!(stats.upserts, 2);
    assert_eq!(stats.reads, 2);
    assert_eq!(stats.read_hits, 1);
    assert_eq!(stats.read_misses, 1);
    assert_eq!(stats.deletes, 1);
    assert_eq!(stats.in_place_updates, 1);
}

#[test]
fn test_random_ops_match_model() {
    use std::collections::HashMap;

    use rand::prelude::*;

    let (_dir, store) = open_store();
    let mut model: HashMap<u64, Vec<u8>> = HashMap::new();
    let mut rng = StdRng::seed_from_u64(0x6d6c6b76);

    for _ in 0..5000 {
        let key = rng.gen_range(0..64u64);
        match rng.gen_range(0..4) {
            0 => {
                let len = rng.gen_range(0..48);
                let value: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                assert_eq!(store.upsert(key, &value), Status::Ok);
                model.insert(key, value);
            }
            1 => {
                let expected = if model.remove(&key).is_some() {
                    Status::Ok
                } else {
                    Status::NotFound
                };
                assert_eq!(store.delete(key), expected);
            }
            2 => match model.get(&key) {
                Some(value) => {
                    assert_eq!(store.mlkv_read(key, value.len()).as_ref(), Ok(value));
                }
                None => assert_eq!(store.mlkv_read(key, 8), Err(Status::NotFound)),
            },
            _ => {
                let expected = model.get(&key).cloned().ok_or(Status::NotFound);
                assert_eq!(store.read(key), expected);
            }
        }
    }
}
