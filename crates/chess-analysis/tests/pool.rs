//! Engine pool behaviour against in-memory engines.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chess_analysis::{
    CancelToken, EngineError, EnginePool, EngineSettings, PoolError, PoolStatus,
};
use common::{FakeLauncher, ENGINE_NAME};

const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition should hold within two seconds");
}

#[tokio::test]
async fn pool_starts_every_engine_up_front() {
    let launcher = FakeLauncher::default();
    let pool = EnginePool::new(launcher.clone(), 3).await.unwrap();

    assert_eq!(launcher.launches(), 3);
    assert_eq!(pool.status(), PoolStatus { size: 3, available: 3 });
    assert_eq!(pool.engine_name(), ENGINE_NAME);
}

#[tokio::test]
async fn zero_sized_pool_is_rejected() {
    let result = EnginePool::new(FakeLauncher::default(), 0).await;
    assert!(matches!(result, Err(PoolError::EmptyPool)));
}

#[tokio::test]
async fn construction_fails_when_an_engine_cannot_start() {
    let launcher = FakeLauncher::default();
    launcher.refuse_launches();

    let result = EnginePool::new(launcher, 2).await;
    assert!(matches!(
        result,
        Err(PoolError::Launch(EngineError::Initialization(_)))
    ));
}

#[tokio::test]
async fn acquire_waits_while_every_engine_is_busy() {
    let pool = EnginePool::new(FakeLauncher::default(), 2).await.unwrap();

    let first = pool.acquire().await.unwrap();
    let _second = pool.acquire().await.unwrap();
    assert_eq!(pool.status().available, 0);

    let blocked = tokio::time::timeout(Duration::from_millis(100), pool.acquire()).await;
    assert!(blocked.is_err(), "third acquire should wait");

    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire().await.map(|engine| engine.is_ready()) }
    });
    first.release();

    let woke = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("released engine should wake the waiter")
        .unwrap();
    assert!(woke.unwrap());
}

#[tokio::test]
async fn release_wakes_exactly_one_waiter() {
    let pool = EnginePool::new(FakeLauncher::default(), 1).await.unwrap();
    let held = pool.acquire().await.unwrap();

    let acquired = Arc::new(AtomicUsize::new(0));
    let waiters: Vec<_> = (0..2)
        .map(|_| {
            let pool = pool.clone();
            let acquired = Arc::clone(&acquired);
            tokio::spawn(async move {
                let engine = pool.acquire().await.unwrap();
                acquired.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(engine);
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(acquired.load(Ordering::SeqCst), 0);

    drop(held);
    wait_for(|| acquired.load(Ordering::SeqCst) >= 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(acquired.load(Ordering::SeqCst), 1);

    for waiter in waiters {
        waiter.abort();
    }
}

#[tokio::test]
async fn released_engine_is_reused() {
    let launcher = FakeLauncher::default();
    let pool = EnginePool::new(launcher.clone(), 1).await.unwrap();
    let settings = EngineSettings::default();

    for _ in 0..3 {
        let mut engine = pool.acquire().await.unwrap();
        let result = engine
            .analyze_position(START_FEN, &settings, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(result.best_move.as_deref(), Some("e2e4"));
    }

    assert_eq!(launcher.launches(), 1);
    assert_eq!(launcher.searches(), 3);
    assert_eq!(pool.status().available, 1);
}

#[tokio::test]
async fn broken_engine_is_replaced() {
    let launcher = FakeLauncher::default();
    let pool = EnginePool::new(launcher.clone(), 1).await.unwrap();
    let settings = EngineSettings::default();

    launcher.crash_next_search();
    let mut engine = pool.acquire().await.unwrap();
    let err = engine
        .analyze_position(START_FEN, &settings, &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Protocol(_)));
    assert!(!engine.is_ready());
    engine.release();

    wait_for(|| pool.status().available == 1).await;
    assert_eq!(launcher.launches(), 2);
    assert_eq!(pool.size(), 1);

    let mut engine = pool.acquire().await.unwrap();
    assert!(engine
        .analyze_position(START_FEN, &settings, &CancelToken::new())
        .await
        .is_ok());
}

#[tokio::test]
async fn failed_replacement_retires_the_slot() {
    let launcher = FakeLauncher::default();
    let pool = EnginePool::new(launcher.clone(), 2).await.unwrap();

    launcher.crash_next_search();
    launcher.refuse_launches();
    let mut engine = pool.acquire().await.unwrap();
    let _ = engine
        .analyze_position(START_FEN, &EngineSettings::default(), &CancelToken::new())
        .await;
    engine.release();

    wait_for(|| pool.size() == 1).await;
    assert_eq!(pool.status(), PoolStatus { size: 1, available: 1 });
}

#[tokio::test]
async fn pool_without_engines_fails_acquire() {
    let launcher = FakeLauncher::default();
    let pool = EnginePool::new(launcher.clone(), 1).await.unwrap();

    launcher.crash_next_search();
    launcher.refuse_launches();
    let mut engine = pool.acquire().await.unwrap();
    let _ = engine
        .analyze_position(START_FEN, &EngineSettings::default(), &CancelToken::new())
        .await;
    engine.release();

    wait_for(|| pool.size() == 0).await;
    let result = tokio::time::timeout(Duration::from_secs(1), pool.acquire())
        .await
        .expect("acquire on an empty pool should fail immediately");
    assert!(matches!(result, Err(PoolError::Exhausted)));
    assert!(!pool.is_closed());
}

#[tokio::test]
async fn waiter_is_woken_when_last_slot_retires() {
    let launcher = FakeLauncher::default();
    let pool = EnginePool::new(launcher.clone(), 1).await.unwrap();

    launcher.crash_next_search();
    launcher.refuse_launches();
    let mut engine = pool.acquire().await.unwrap();
    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire().await.map(|_| ()) }
    });
    let _ = engine
        .analyze_position(START_FEN, &EngineSettings::default(), &CancelToken::new())
        .await;
    engine.release();

    let result = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter should not hang")
        .unwrap();
    assert!(matches!(result, Err(PoolError::Exhausted)));
}

#[tokio::test]
async fn closed_pool_refuses_acquire() {
    let pool = EnginePool::new(FakeLauncher::default(), 2).await.unwrap();

    pool.close().await.unwrap();
    assert!(pool.is_closed());
    assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));

    // Closing twice is a no-op.
    pool.close().await.unwrap();
}

#[tokio::test]
async fn engines_returned_after_close_are_discarded() {
    let launcher = FakeLauncher::default();
    let pool = EnginePool::new(launcher.clone(), 2).await.unwrap();
    let engine = pool.acquire().await.unwrap();

    pool.close().await.unwrap();
    engine.release();

    assert_eq!(pool.status().available, 0);
    assert_eq!(launcher.launches(), 2);
}
