//! Integration tests for the pool manager lifecycle.

mod common;

use pooldb::{DbError, PoolConfig, PoolError, PoolManager, QueryExecutor, QueryOptions};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_initialize_twice_creates_one_pool() {
    let db = common::open();

    db.manager.initialize().await.unwrap();
    db.manager.initialize().await.unwrap();

    let stats = db.manager.statistics().await.unwrap();
    assert_eq!(stats.generation, 1);
    assert!(stats.size <= stats.max_size);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_initialize_is_single_flight() {
    let db = common::open();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&db.manager);
            tokio::spawn(async move { manager.initialize().await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(db.manager.statistics().await.unwrap().generation, 1);
}

#[tokio::test]
async fn test_acquire_initializes_lazily() {
    let db = common::open();
    assert!(!db.manager.is_initialized().await);

    let rows = db
        .executor
        .query("SELECT 1 AS one", &[], &QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["one"], 1);
    assert!(db.manager.is_initialized().await);
}

#[tokio::test]
async fn test_init_failure_is_reported() {
    let config = PoolConfig::new("sqlite:/nonexistent-pooldb-dir/nested/test.db?mode=rwc")
        .with_acquire_timeout(2);
    let manager = Arc::new(PoolManager::new(config));

    let err = manager.initialize().await.unwrap_err();
    assert!(matches!(err, PoolError::InitFailed { .. }));
    assert!(err.suggestion().is_some());
    assert!(!manager.is_initialized().await);

    let executor = QueryExecutor::new(Arc::clone(&manager));
    let err = executor
        .query("SELECT 1", &[], &QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Pool(PoolError::InitFailed { .. })));
}

#[tokio::test]
async fn test_invalid_config_rejected_before_connecting() {
    let manager = PoolManager::new(PoolConfig::new("sqlite:unused.db").with_bounds(3, 2, 1));
    let err = manager.initialize().await.unwrap_err();
    assert!(matches!(err, PoolError::InvalidConfig { .. }));
}

#[tokio::test]
async fn test_acquire_times_out_when_exhausted() {
    let db = common::open_with(|config| config.with_bounds(1, 1, 1).with_acquire_timeout(1));

    let held = db.manager.acquire().await.unwrap();
    let start = Instant::now();
    let err = db.manager.acquire().await.unwrap_err();

    assert!(matches!(err, PoolError::AcquireFailed { .. }));
    assert!(err.is_retryable());
    assert!(start.elapsed() >= Duration::from_millis(900));

    held.release().await;
    let again = db.manager.acquire().await.unwrap();
    again.release().await;

    let stats = db.manager.statistics().await.unwrap();
    assert_eq!(stats.acquire_failures, 1);
    assert!(stats.is_balanced());
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_pool_reinitializes() {
    let db = common::open();
    db.manager.initialize().await.unwrap();

    db.manager.shutdown(Duration::from_secs(1)).await.unwrap();
    assert!(!db.manager.is_initialized().await);
    assert!(db.manager.statistics().await.is_none());

    db.manager.shutdown(Duration::from_secs(1)).await.unwrap();

    db.executor
        .query("SELECT 1", &[], &QueryOptions::default())
        .await
        .unwrap();
    let stats = db.manager.statistics().await.unwrap();
    assert_eq!(stats.generation, 2);
    assert_eq!(stats.active, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_waits_for_in_flight_connections() {
    let db = common::open();
    let conn = db.manager.acquire().await.unwrap();

    let releaser = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        conn.release().await;
    });

    let start = Instant::now();
    db.manager.shutdown(Duration::from_secs(5)).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(150));
    assert!(start.elapsed() < Duration::from_secs(5));
    releaser.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_force_closes_after_drain_period() {
    let db = common::open();
    let conn = db.manager.acquire().await.unwrap();

    let start = Instant::now();
    db.manager
        .shutdown(Duration::from_millis(100))
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(3));
    assert!(!db.manager.is_initialized().await);

    // The late release is still accounted for
    conn.release().await;
    db.executor
        .query("SELECT 1", &[], &QueryOptions::default())
        .await
        .unwrap();
    assert!(db.manager.statistics().await.unwrap().is_balanced());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queries_stay_within_bounds() {
    let db = common::open_with(|config| config.with_bounds(1, 5, 1));
    common::create_schema(&db.executor).await;
    db.executor
        .execute(
            "INSERT INTO orders (customer, total) VALUES ('acme', 10.0)",
            &[],
            true,
        )
        .await
        .unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let executor = db.executor.clone();
            tokio::spawn(async move {
                executor
                    .query("SELECT * FROM orders", &[], &QueryOptions::default())
                    .await
            })
        })
        .collect();

    for handle in handles {
        let rows = handle.await.unwrap().unwrap();
        assert_eq!(rows.len(), 1);
    }

    let stats = db.manager.statistics().await.unwrap();
    assert!(stats.peak_active <= 5, "peak {}", stats.peak_active);
    assert!(stats.size <= 5);
    assert_eq!(stats.active, 0);
    assert!(stats.is_balanced());
    // schema (2) + seed insert (1) + 10 queries
    assert_eq!(stats.total_acquired, 13);
}

#[tokio::test]
async fn test_close_on_release_keeps_accounting_balanced() {
    let db = common::open_with(|config| config.with_bounds(0, 2, 1).with_close_on_release(true));

    for _ in 0..3 {
        db.executor
            .query("SELECT 1", &[], &QueryOptions::default())
            .await
            .unwrap();
    }

    let stats = db.manager.statistics().await.unwrap();
    assert_eq!(stats.total_acquired, 3);
    assert!(stats.is_balanced());
}

#[tokio::test]
async fn test_pool_grows_by_increment() {
    let db = common::open_with(|config| config.with_bounds(1, 5, 3));
    db.manager.initialize().await.unwrap();

    // The second checkout cannot find an idle connection, which triggers growth
    let first = db.manager.acquire().await.unwrap();
    let second = db.manager.acquire().await.unwrap();

    let mut size = 0;
    for _ in 0..100 {
        size = db.manager.statistics().await.unwrap().size;
        if size >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    first.release().await;
    second.release().await;

    assert!(size >= 3, "pool size {size}");
    assert!(size <= 5);
}
