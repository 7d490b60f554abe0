// tests/db_store.rs

mod common;
use crate::common::{init_tracing, texture_config, texture_pipeline, with_timeout, GAME};

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use assetpipe::builder::SourceFileDependency;
use assetpipe::db::{AssetDatabase, FileStateStore, MemoryStateStore, StateStore};
use assetpipe::fs::mock::MockFileSystem;
use assetpipe::fs::{FileSystem, RealFileSystem};

type TestResult = Result<(), Box<dyn Error>>;

/// A database holding two built sources, one depending on the other.
async fn built_database() -> AssetDatabase {
    let fs = MockFileSystem::new();
    fs.add_file(Path::new(GAME).join("a.png"), "a");
    fs.add_file(Path::new(GAME).join("Textures/B.png"), "b");
    let cfg = texture_config();
    let (mut pipeline, builder) = texture_pipeline(&cfg, &fs);
    builder.set_dependencies("a.png", vec![SourceFileDependency::by_path("Textures/B.png")]);

    pipeline.scan();
    with_timeout(pipeline.settle()).await;
    pipeline.database().clone()
}

#[tokio::test]
async fn file_store_round_trips_on_disk() -> TestResult {
    init_tracing();
    let db = built_database().await;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state/assetdb.json");
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    let mut store = FileStateStore::new(&path, fs.clone());
    store.save(&db)?;
    assert!(path.is_file());
    assert!(!dir.path().join("state/assetdb.json.tmp").exists());

    let loaded = FileStateStore::new(&path, fs).load()?;

    assert_eq!(loaded.sources().count(), db.sources().count());
    assert_eq!(loaded.products().count(), 4);
    let b = loaded.source_by_name("TEXTURES/b.png").ok_or("index not rebuilt")?;
    assert_eq!(b.database_name, "Textures/B.png");
    assert_eq!(loaded.source_by_uuid(&b.uuid).map(|s| s.id), Some(b.id));
    assert_eq!(
        loaded.dependencies.dependents_of("textures/b.png").len(),
        1,
        "dependency indexes are rebuilt"
    );
    for product in db.products() {
        assert!(loaded.product_by_path(&product.product_path).is_some());
    }
    Ok(())
}

#[test]
fn missing_file_loads_an_empty_database() -> TestResult {
    let dir = tempfile::tempdir()?;
    let store = FileStateStore::new(dir.path().join("none.json"), Arc::new(RealFileSystem));
    let db = store.load()?;
    assert_eq!(db.sources().count(), 0);
    Ok(())
}

#[test]
fn corrupt_file_is_an_error() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("/cache/assetdb.json", "{ not json");
    let store = FileStateStore::new("/cache/assetdb.json", Arc::new(fs));
    assert!(store.load().is_err());
    Ok(())
}

#[test]
fn failed_write_keeps_the_previous_state() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("/cache/assetdb.json", "{}");
    fs.deny_writes_under("/cache");
    let mut store = FileStateStore::new("/cache/assetdb.json", Arc::new(fs.clone()));

    assert!(store.save(&AssetDatabase::new()).is_err());
    assert_eq!(fs.read_to_string(Path::new("/cache/assetdb.json"))?, "{}");
    Ok(())
}

#[tokio::test]
async fn memory_store_counts_saves() -> TestResult {
    init_tracing();
    let db = built_database().await;

    let mut store = MemoryStateStore::new();
    assert_eq!(store.load()?.sources().count(), 0);

    store.save(&db)?;
    store.save(&db)?;
    assert_eq!(store.save_count(), 2);
    assert_eq!(store.load()?.sources().count(), 2);
    Ok(())
}
