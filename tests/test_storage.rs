//! Persistence sink tests for both store backends

use senml_pipeline::broker::{persist, PersistenceRecord};
use senml_pipeline::storage::{
    DocumentStore, SqliteStore, StorageError, StoreBackend, StoreSession,
};
use serde_json::{json, Value};

fn record(topic: &str, payload: Value) -> PersistenceRecord {
    PersistenceRecord::from_payload(topic, payload.to_string().as_bytes()).unwrap()
}

#[tokio::test]
async fn test_connect_selects_backend_by_scheme() {
    assert!(matches!(
        StoreBackend::connect("memory://").await.unwrap(),
        StoreBackend::Memory(_)
    ));
    assert!(matches!(
        StoreBackend::connect("sqlite::memory:").await.unwrap(),
        StoreBackend::Sqlite(_)
    ));

    for url in ["mongodb://localhost/db", "postgres://x", "nonsense", "sqlite://"] {
        assert!(
            matches!(StoreBackend::connect(url).await, Err(StorageError::InvalidUrl(_))),
            "{url} should be rejected"
        );
    }
}

#[tokio::test]
async fn test_sqlite_file_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.db");

    {
        let store = SqliteStore::open(&path).await.unwrap();
        persist(&store, "logs", &record("Bedroom", json!({"v": 1, "t": 1000})))
            .await
            .unwrap();
        persist(&store, "logs", &record("Garage", json!({"v": 2, "t": 2000})))
            .await
            .unwrap();
    }

    let reopened = SqliteStore::open(&path).await.unwrap();
    assert_eq!(reopened.count("logs").await.unwrap(), 2);

    let documents = reopened.documents("logs").await.unwrap();
    assert_eq!(
        Value::Object(documents[0].clone()),
        json!({"v": 1, "t": 1000, "topic": "Bedroom"})
    );
    assert_eq!(documents[1]["topic"], "Garage");
}

#[tokio::test]
async fn test_sqlite_url_opens_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("logs.db").display());

    let store = StoreBackend::connect(&url).await.unwrap();
    persist(&store, "logs", &record("LivingRoom", json!({"v": 3})))
        .await
        .unwrap();

    match store {
        StoreBackend::Sqlite(sqlite) => assert_eq!(sqlite.count("logs").await.unwrap(), 1),
        StoreBackend::Memory(_) => panic!("sqlite:// should select the SQLite store"),
    }
}

#[tokio::test]
async fn test_collections_are_separate() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    persist(&store, "logs", &record("Garage", json!({"v": 1})))
        .await
        .unwrap();
    persist(&store, "archive", &record("Garage", json!({"v": 2})))
        .await
        .unwrap();

    assert_eq!(store.count("logs").await.unwrap(), 1);
    assert_eq!(store.count("archive").await.unwrap(), 1);
    assert_eq!(store.count("missing").await.unwrap(), 0);
}

#[tokio::test]
async fn test_sessions_are_independent_and_closable() {
    let store = StoreBackend::connect("memory://").await.unwrap();
    let document = json!({"v": 1, "topic": "Garage"}).as_object().cloned().unwrap();

    let mut first = store.open_session().await.unwrap();
    let mut second = store.open_session().await.unwrap();
    first.insert_one("logs", &document).await.unwrap();
    first.close().await.unwrap();
    second.insert_one("logs", &document).await.unwrap();
    second.close().await.unwrap();
    second.close().await.unwrap();

    assert!(matches!(
        first.insert_one("logs", &document).await,
        Err(StorageError::SessionClosed)
    ));
    match &store {
        StoreBackend::Memory(memory) => assert_eq!(memory.count("logs").await, 2),
        StoreBackend::Sqlite(_) => unreachable!(),
    }
}

#[tokio::test]
async fn test_concurrent_sqlite_inserts() {
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(SqliteStore::open(dir.path().join("c.db")).await.unwrap());

    let mut tasks = Vec::new();
    for seq in 0..25 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            persist(store.as_ref(), "logs", &record("Garage", json!({"seq": seq}))).await
        }));
    }
    for result in futures::future::join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(store.count("logs").await.unwrap(), 25);
}
