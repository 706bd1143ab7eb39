//! Integration tests for the reconciliation stores and product catalogue.
//!
//! Run with: cargo test --package taglink-storage --test reconciliation

use rstest::rstest;
use std::sync::Arc;
use taglink_core::ObservedAt;
use taglink_storage::{
    AnyTagStore, Database, DatabaseConfig, MemoryTagStore, NewProduct, ProductRepository,
    ReconciliationStore, SqliteProductRepository, SqliteTagStore, StorageError, TagFields,
};
use tokio::sync::Barrier;

fn fields(antenna: u16, micros: i64) -> TagFields {
    TagFields {
        antenna: Some(antenna),
        signal_strength: Some(-40.0 - f64::from(antenna)),
        observed_at: ObservedAt::from_micros(micros).unwrap(),
        seen_count: 1,
    }
}

#[derive(Debug, Clone, Copy)]
enum Backend {
    Sqlite,
    Memory,
}

async fn store(backend: Backend) -> AnyTagStore {
    match backend {
        Backend::Sqlite => {
            let db = Database::in_memory().await.unwrap();
            SqliteTagStore::new(db.pool().clone()).into()
        }
        Backend::Memory => MemoryTagStore::new().into(),
    }
}

#[rstest]
#[case::sqlite(Backend::Sqlite)]
#[case::memory(Backend::Memory)]
#[tokio::test]
async fn test_second_upsert_updates_in_place(#[case] backend: Backend) {
    let store = store(backend).await;

    let first = store.upsert("E200", &fields(1, 1_000)).await.unwrap();
    assert!(first.created);
    assert_eq!(first.antenna, Some(1));

    let second = store.upsert("E200", &fields(2, 2_000)).await.unwrap();
    assert!(!second.created);
    assert_eq!(second.id, first.id);
    assert_eq!(second.antenna, Some(2));
    assert_eq!(second.observed_at.as_micros(), 2_000);

    let all = store.list_recent(0, 100).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].antenna, Some(2));
}

#[rstest]
#[case::sqlite(Backend::Sqlite)]
#[case::memory(Backend::Memory)]
#[tokio::test]
async fn test_older_observation_still_overwrites(#[case] backend: Backend) {
    // Observation times are not monotonic per identity; last writer wins
    let store = store(backend).await;

    store.upsert("E200", &fields(1, 5_000)).await.unwrap();
    let stored = store.upsert("E200", &fields(3, 1_000)).await.unwrap();

    assert_eq!(stored.antenna, Some(3));
    assert_eq!(stored.observed_at.as_micros(), 1_000);
}

#[rstest]
#[case::sqlite(Backend::Sqlite)]
#[case::memory(Backend::Memory)]
#[tokio::test]
async fn test_list_recent_orders_and_pages(#[case] backend: Backend) {
    let store = store(backend).await;

    store.upsert("A", &fields(1, 1_000)).await.unwrap();
    store.upsert("B", &fields(1, 3_000)).await.unwrap();
    store.upsert("C", &fields(1, 2_000)).await.unwrap();

    let all: Vec<String> = store
        .list_recent(0, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.identity)
        .collect();
    assert_eq!(all, vec!["B", "C", "A"]);

    let page = store.list_recent(1, 1).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].identity, "C");
    assert!(!page[0].created);
}

#[rstest]
#[case::sqlite(Backend::Sqlite)]
#[case::memory(Backend::Memory)]
#[tokio::test]
async fn test_unknown_fields_round_trip_as_none(#[case] backend: Backend) {
    let store = store(backend).await;
    let sparse = TagFields {
        antenna: None,
        signal_strength: None,
        observed_at: ObservedAt::from_micros(42).unwrap(),
        seen_count: 7,
    };

    let stored = store.upsert("E200", &sparse).await.unwrap();
    assert_eq!(stored.antenna, None);
    assert_eq!(stored.signal_strength, None);
    assert_eq!(stored.seen_count, 7);
}

#[tokio::test]
async fn test_concurrent_upserts_same_identity() {
    let db = Database::in_memory().await.unwrap();
    let store = Arc::new(SqliteTagStore::new(db.pool().clone()));

    const TASKS: u16 = 8;
    let barrier = Arc::new(Barrier::new(TASKS as usize));
    let mut handles = Vec::new();

    for i in 0..TASKS {
        let store = store.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            store.upsert("SHARED", &fields(i + 1, 1_000 + i64::from(i))).await.unwrap()
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.created).count(), 1);
    assert_eq!(store.list_recent(0, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_name_resolved_from_products() {
    let db = Database::in_memory().await.unwrap();
    let products = SqliteProductRepository::new(db.pool().clone());
    let store = SqliteTagStore::new(db.pool().clone());

    products
        .create(&NewProduct::new("DEADBEEF12345678", "Laptop").stock(3))
        .await
        .unwrap();

    let named = store.upsert("DEADBEEF12345678", &fields(1, 1_000)).await.unwrap();
    assert_eq!(named.name.as_deref(), Some("Laptop"));

    let unnamed = store.upsert("CAFEBABE87654321", &fields(1, 2_000)).await.unwrap();
    assert_eq!(unnamed.name, None);

    let listed = store.list_recent(0, 10).await.unwrap();
    assert_eq!(listed[1].name.as_deref(), Some("Laptop"));
}

#[tokio::test]
async fn test_memory_store_names() {
    let store = MemoryTagStore::new();
    store.set_name("E200", "Pallet");

    let stored = store.upsert("E200", &fields(1, 1_000)).await.unwrap();
    assert_eq!(stored.name.as_deref(), Some("Pallet"));
    assert_eq!(store.len(), 1);
    assert_eq!(store.get("E200").unwrap().name.as_deref(), Some("Pallet"));
}

#[tokio::test]
async fn test_product_crud() {
    let db = Database::in_memory().await.unwrap();
    let repo = SqliteProductRepository::new(db.pool().clone());

    let id = repo
        .create(
            &NewProduct::new("E200", "Pallet")
                .description("Blue pallet")
                .image_url("/static/pallet.png"),
        )
        .await
        .unwrap();

    let found = repo.find_by_epc("E200").await.unwrap().unwrap();
    assert_eq!(found.id, id);
    assert_eq!(found.description.as_deref(), Some("Blue pallet"));

    repo.update(id, &NewProduct::new("E200", "Red pallet").stock(9))
        .await
        .unwrap();
    let updated = repo.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(updated.name, "Red pallet");
    assert_eq!(updated.stock, 9);
    assert_eq!(updated.description, None);

    assert_eq!(repo.list(0, 10).await.unwrap().len(), 1);

    repo.delete(id).await.unwrap();
    assert!(repo.find_by_epc("E200").await.unwrap().is_none());
    assert!(matches!(repo.delete(id).await, Err(StorageError::NotFound { .. })));
}

#[tokio::test]
async fn test_duplicate_product_epc() {
    let db = Database::in_memory().await.unwrap();
    let repo = SqliteProductRepository::new(db.pool().clone());

    repo.create(&NewProduct::new("E200", "Pallet")).await.unwrap();
    let result = repo.create(&NewProduct::new("E200", "Other")).await;

    assert!(matches!(result, Err(StorageError::Duplicate { .. })));
}

#[tokio::test]
async fn test_file_database_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("taglink.db");
    let path = path.to_str().unwrap().to_string();

    {
        let db = Database::new(DatabaseConfig::new(&path)).await.unwrap();
        let store = SqliteTagStore::new(db.pool().clone());
        store.upsert("E200", &fields(4, 1_000)).await.unwrap();
        db.close().await;
    }

    let db = Database::new(DatabaseConfig::new(&path)).await.unwrap();
    let store = SqliteTagStore::new(db.pool().clone());
    let records = store.list_recent(0, 10).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].antenna, Some(4));
    db.close().await;
}
