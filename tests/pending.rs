//! Cold records: operations go pending and complete on drain.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mlkv::contexts::{
    IncrementContext, MlkvReadContext, MlkvUpsertContext, SimpleReadContext, SimpleUpsertContext,
};
use mlkv::{Key, Status};

use common::{create_store, evict_all};

#[test]
fn test_cold_read_completes_on_drain() {
    let (_dir, store) = create_store();
    let mut session = store.start_session();
    session.upsert(&mut SimpleUpsertContext::new(Key(1), b"cold".to_vec()), |_, _| {});
    evict_all(&store);

    let result = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&result);
    let mut ctx = SimpleReadContext::new(Key(1));
    let status = session.read(&mut ctx, move |ctx, status| {
        *sink.lock().unwrap() = Some((ctx.into_value(), status));
    });
    assert_eq!(status, Status::Pending);
    assert_eq!(session.pending_count(), 1);
    assert!(result.lock().unwrap().is_none());

    assert!(session.complete_pending(true));
    assert_eq!(session.pending_count(), 0);
    assert_eq!(
        result.lock().unwrap().take(),
        Some((b"cold".to_vec(), Status::Ok))
    );
}

#[test]
fn test_cold_mlkv_read_applies_increment_once() {
    let (_dir, store) = create_store();
    let mut session = store.start_session();
    session.upsert(&mut SimpleUpsertContext::new(Key(1), vec![5u8; 16]), |_, _| {});
    evict_all(&store);

    let completed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completed);
    let mut ctx = MlkvReadContext::new(Key(1), 16);
    let status = session.rmw(&mut ctx, move |ctx, status| {
        assert_eq!(status, Status::Ok);
        assert!(ctx.found());
        assert_eq!(ctx.value(), &[5u8; 16]);
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(status, Status::Pending);
    assert_eq!(store.staleness(Key(1)), Some(0));

    session.complete_pending(true);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert_eq!(store.staleness(Key(1)), Some(1));

    // The relocated record is hot again.
    let mut ctx = MlkvUpsertContext::new(Key(1), vec![6u8; 16]);
    assert_eq!(session.rmw(&mut ctx, |_, _| {}), Status::Ok);
    assert_eq!(store.staleness(Key(1)), Some(0));
}

#[test]
fn test_cold_increment() {
    let (_dir, store) = create_store();
    let mut session = store.start_session();
    session.upsert(
        &mut SimpleUpsertContext::new(Key(9), 40u64.to_le_bytes().to_vec()),
        |_, _| {},
    );
    evict_all(&store);

    let mut ctx = IncrementContext::from_u64(Key(9), 2);
    assert_eq!(session.rmw(&mut ctx, |_, status| assert_eq!(status, Status::Ok)), Status::Pending);
    session.complete_pending(true);

    let mut read = SimpleReadContext::new(Key(9));
    assert_eq!(session.read(&mut read, |_, _| {}), Status::Ok);
    assert_eq!(read.value(), &42u64.to_le_bytes());
}

#[test]
fn test_upsert_over_cold_record_is_not_pending() {
    let (_dir, store) = create_store();
    let mut session = store.start_session();
    session.upsert(&mut SimpleUpsertContext::new(Key(1), b"old".to_vec()), |_, _| {});
    evict_all(&store);

    let mut ctx = SimpleUpsertContext::new(Key(1), b"new".to_vec());
    assert_eq!(session.upsert(&mut ctx, |_, _| {}), Status::Ok);

    let mut read = SimpleReadContext::new(Key(1));
    assert_eq!(session.read(&mut read, |_, _| {}), Status::Ok);
    assert_eq!(read.value(), b"new");
}

#[test]
fn test_stopping_session_drains_pending() {
    let (_dir, store) = create_store();
    let mut session = store.start_session();
    for key in 0..10u64 {
        session.upsert(&mut SimpleUpsertContext::new(Key(key), vec![key as u8; 8]), |_, _| {});
    }
    evict_all(&store);

    let completed = Arc::new(AtomicUsize::new(0));
    for key in 0..10u64 {
        let counter = Arc::clone(&completed);
        let mut ctx = SimpleReadContext::new(Key(key));
        let status = session.read(&mut ctx, move |ctx, status| {
            assert_eq!(status, Status::Ok);
            assert_eq!(ctx.value(), &[key as u8; 8]);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(status, Status::Pending);
    }
    assert_eq!(session.pending_count(), 10);

    session.stop();
    assert_eq!(completed.load(Ordering::SeqCst), 10);
    assert_eq!(store.active_session_count(), 0);
}

#[test]
fn test_facade_hides_pending() {
    let (_dir, store) = common::open_store();
    store.upsert(1, b"value");
    store.upsert(2, &1u64.to_le_bytes());
    evict_all(store.inner());

    assert_eq!(store.read(1).unwrap(), b"value");
    assert_eq!(store.mlkv_read(1, 5).unwrap(), b"value");
    assert_eq!(store.staleness(1), Some(1));
    assert_eq!(store.rmw_u64(2, 1), Status::Ok);
    assert_eq!(store.read_u64(2), Ok(2));
    assert!(store.stats().pending >= 3);
}
