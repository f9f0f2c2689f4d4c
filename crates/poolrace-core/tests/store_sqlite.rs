//! Integration tests: `ReplicatedStore` over a real SQLite file.

use poolrace_core::config::{Dialect, StoreConfig, TargetConfig};
use poolrace_core::dispatcher::{Dispatcher, RepeatSource};
use poolrace_core::retry::{ErrorKind, RetryPolicy};
use poolrace_core::store::{Query, ReplicatedStore, Store};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn sqlite_config(dir: &TempDir, replicas: usize) -> StoreConfig {
    StoreConfig {
        dialect: Dialect::Sqlite,
        database: dir.path().join("poolrace.db").to_string_lossy().into_owned(),
        min_connections: 0,
        benchmark: true,
        write: TargetConfig::host("primary"),
        read: (0..replicas)
            .map(|i| TargetConfig::host(format!("replica-{i}")))
            .collect(),
    }
}

#[tokio::test]
async fn authenticate_and_execute() {
    let dir = TempDir::new().unwrap();
    let store = ReplicatedStore::connect_lazy(&sqlite_config(&dir, 2), 4).unwrap();
    assert_eq!(store.target_count(), 3);
    store.authenticate().await.unwrap();

    store.execute(&Query::read("SELECT 1;")).await.unwrap();

    store
        .execute(&Query::write("CREATE TABLE hits (n INTEGER NOT NULL)"))
        .await
        .unwrap();
    let out = store
        .execute(&Query::write("INSERT INTO hits (n) VALUES (1), (2), (3)"))
        .await
        .unwrap();
    assert_eq!(out.rows_affected, 3);
    store.close().await;
}

#[tokio::test]
async fn bad_sql_is_a_fatal_database_error() {
    let dir = TempDir::new().unwrap();
    let store = ReplicatedStore::connect_lazy(&sqlite_config(&dir, 1), 2).unwrap();

    let err = store
        .execute(&Query::read("SELEC 1"))
        .await
        .expect_err("syntax error");
    assert_eq!(err.signature, "DatabaseError");
    assert_eq!(RetryPolicy::default().classify(&err), ErrorKind::Fatal);
    store.close().await;
}

#[test]
fn empty_read_targets_are_rejected() {
    let dir = TempDir::new().unwrap();
    let mut cfg = sqlite_config(&dir, 0);
    cfg.read.clear();
    assert!(ReplicatedStore::connect_lazy(&cfg, 4).is_err());
}

#[tokio::test]
async fn dispatch_against_sqlite() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(ReplicatedStore::connect_lazy(&sqlite_config(&dir, 2), 4).unwrap());
    store.authenticate().await.unwrap();

    let dispatcher = Dispatcher::new(store.clone(), RetryPolicy::default(), 4).unwrap();
    let summary = dispatcher
        .run(
            RepeatSource::finite(Query::read("SELECT 1;"), 20),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(summary.succeeded, 20);
    assert_eq!(summary.total(), 20);
    assert!(summary.peak_in_flight <= 4);
    store.close().await;
}
