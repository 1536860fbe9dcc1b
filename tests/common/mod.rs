//! Shared fixtures for the SQLite-backed integration tests.

#![allow(dead_code)]

use pooldb::{PoolConfig, PoolManager, QueryExecutor};
use std::sync::Arc;
use tempfile::TempDir;

/// A pool over a fresh SQLite file. The directory is removed on drop.
pub struct TestDb {
    pub dir: TempDir,
    pub manager: Arc<PoolManager>,
    pub executor: QueryExecutor,
}

pub fn sqlite_config(dir: &TempDir) -> PoolConfig {
    let path = dir.path().join("pooldb-test.db");
    PoolConfig::new(format!("sqlite:{}?mode=rwc", path.display()))
        .with_acquire_timeout(5)
        .with_drain_timeout(5)
}

/// Open a test database with the given pool bounds.
pub fn open_with(customize: impl FnOnce(PoolConfig) -> PoolConfig) -> TestDb {
    let dir = tempfile::tempdir().unwrap();
    let config = customize(sqlite_config(&dir));
    let manager = Arc::new(PoolManager::new(config));
    let executor = QueryExecutor::new(Arc::clone(&manager));
    TestDb {
        dir,
        manager,
        executor,
    }
}

pub fn open() -> TestDb {
    open_with(|config| config.with_bounds(1, 5, 1))
}

/// Open a test database and create the order schema.
pub async fn open_with_schema() -> TestDb {
    let db = open();
    create_schema(&db.executor).await;
    db
}

pub async fn create_schema(executor: &QueryExecutor) {
    executor
        .execute(
            "CREATE TABLE orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                customer TEXT NOT NULL,
                total REAL,
                placed_at DATETIME
            )",
            &[],
            true,
        )
        .await
        .unwrap();
    executor
        .execute(
            "CREATE TABLE order_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL REFERENCES orders(id),
                sku TEXT NOT NULL,
                qty INTEGER NOT NULL
            )",
            &[],
            true,
        )
        .await
        .unwrap();
}
