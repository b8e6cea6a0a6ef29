//! Async session tests.

mod common;

use mlkv::contexts::{
    IncrementContext, MlkvReadContext, MlkvUpsertContext, SimpleDeleteContext, SimpleReadContext,
    SimpleUpsertContext,
};
use mlkv::{Key, Status};

use common::{create_store, evict_all};

#[tokio::test]
async fn test_async_upsert_read_delete() {
    let (_dir, store) = create_store();
    let mut session = store.start_async_session();

    let (_, status) = session
        .upsert_async(SimpleUpsertContext::new(Key(1), b"async".to_vec()))
        .await;
    assert_eq!(status, Status::Ok);

    let (ctx, status) = session.read_async(SimpleReadContext::new(Key(1))).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(ctx.value(), b"async");

    let (_, status) = session.delete_async(SimpleDeleteContext::new(Key(1))).await;
    assert_eq!(status, Status::Ok);
    let (_, status) = session.read_async(SimpleReadContext::new(Key(1))).await;
    assert_eq!(status, Status::NotFound);
    assert_eq!(session.serial_num(), 4);
}

#[tokio::test]
async fn test_async_mlkv_operations() {
    let (_dir, store) = create_store();
    let mut session = store.start_async_session();
    session
        .upsert_async(SimpleUpsertContext::new(Key(2), vec![0u8; 16]))
        .await;

    for _ in 0..2 {
        let (ctx, status) = session.rmw_async(MlkvReadContext::new(Key(2), 16)).await;
        assert_eq!(status, Status::Ok);
        assert!(ctx.found());
    }
    let (_, status) = session
        .rmw_async(MlkvUpsertContext::new(Key(2), vec![1u8; 16]))
        .await;
    assert_eq!(status, Status::Ok);
    assert_eq!(store.staleness(Key(2)), Some(1));

    let (ctx, status) = session.rmw_async(MlkvReadContext::new(Key(3), 16)).await;
    assert_eq!(status, Status::NotFound);
    assert!(!ctx.found());
}

#[tokio::test]
async fn test_async_cold_operations_complete() {
    let (_dir, store) = create_store();
    let mut session = store.start_async_session();
    session
        .upsert_async(SimpleUpsertContext::new(Key(1), 1u64.to_le_bytes().to_vec()))
        .await;
    evict_all(&store);

    let (ctx, status) = session.read_async(SimpleReadContext::new(Key(1))).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(ctx.value(), &1u64.to_le_bytes());

    let (_, status) = session.rmw_async(IncrementContext::from_u64(Key(1), 1)).await;
    assert_eq!(status, Status::Ok);
    let (ctx, _) = session.read_async(SimpleReadContext::new(Key(1))).await;
    assert_eq!(ctx.value(), &2u64.to_le_bytes());
    assert!(session.complete_pending_async().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_sessions_across_tasks() {
    let (_dir, store) = create_store();
    let mut tasks = Vec::new();
    for t in 0..4u64 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let mut session = store.start_async_session();
            for i in 0..100u64 {
                let key = Key(t * 1000 + i);
                let (_, status) = session
                    .upsert_async(SimpleUpsertContext::new(key, i.to_le_bytes().to_vec()))
                    .await;
                assert_eq!(status, Status::Ok);
            }
            session.serial_num()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), 100);
    }
    assert_eq!(store.active_session_count(), 0);
}
