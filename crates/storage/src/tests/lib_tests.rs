use super::*;

#[tokio::test]
async fn stores_and_overwrites_entries() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.put("presentation", "{\"v\":1}").await.expect("put");
    storage.put("presentation", "{\"v\":2}").await.expect("overwrite");

    assert_eq!(
        storage.get("presentation").await.expect("get").as_deref(),
        Some("{\"v\":2}")
    );
    assert_eq!(storage.entries().await.expect("entries").len(), 1);
}

#[tokio::test]
async fn missing_entry_reads_as_none() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert!(storage.get("nothing").await.expect("get").is_none());
    assert!(!storage.remove("nothing").await.expect("remove"));
}

#[tokio::test]
async fn clear_removes_every_entry() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.put("a", "1").await.expect("put");
    storage.put("b", "2").await.expect("put");

    assert_eq!(storage.clear().await.expect("clear"), 2);
    assert!(storage.entries().await.expect("entries").is_empty());
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("presenter_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("handoff.db");
    let database_url = normalize_database_url(db_path.to_string_lossy().as_ref());

    let storage = Storage::new(&database_url).await.expect("db");
    storage.put("k", "v").await.expect("put");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[tokio::test]
async fn memory_store_lists_entries_in_key_order() {
    let store = MemoryHandoffStore::new();
    store.put("b", "2").await.expect("put");
    store.put("a", "1").await.expect("put");

    let keys: Vec<String> = store
        .entries()
        .await
        .expect("entries")
        .into_iter()
        .map(|entry| entry.key)
        .collect();
    assert_eq!(keys, vec!["a", "b"]);
    assert!(store.remove("a").await.expect("remove"));
    assert_eq!(store.clear().await.expect("clear"), 1);
}

#[test]
fn normalizes_plain_paths_and_memory_aliases() {
    assert_eq!(
        normalize_database_url("./data/handoff.db"),
        "sqlite://./data/handoff.db"
    );
    assert_eq!(normalize_database_url(""), "sqlite::memory:");
    assert_eq!(normalize_database_url(":memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("sqlite://already.db"),
        "sqlite://already.db"
    );
}
