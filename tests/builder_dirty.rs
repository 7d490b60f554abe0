// tests/builder_dirty.rs

mod common;
use crate::common::pipeline::TestPipeline;
use crate::common::scripted_builder::ScriptedBuilder;
use crate::common::{init_tracing, texture_config, texture_pipeline, with_timeout, GAME};

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use assetpipe::builder::Builder;
use assetpipe::db::AssetDatabase;
use assetpipe::fs::mock::MockFileSystem;
use assetpipe::fs::FileSystem;
use assetpipe::registry::BuilderRegistry;

type TestResult = Result<(), Box<dyn Error>>;

fn scripted(name: &str, fs: &MockFileSystem) -> ScriptedBuilder {
    ScriptedBuilder::new(name, "*.png", Arc::new(fs.clone()) as Arc<dyn FileSystem>)
}

fn registry(builders: Vec<ScriptedBuilder>) -> BuilderRegistry {
    let mut registry = BuilderRegistry::new();
    for builder in builders {
        registry.register(Arc::new(builder));
    }
    registry
}

#[test]
fn builders_are_dirty_until_computed() {
    let fs = MockFileSystem::new();
    let registry = registry(vec![scripted("texture", &fs)]);
    let bus_id = registry.get("texture").unwrap().descriptor().bus_id;

    assert!(registry.is_builder_dirty(&bus_id));
    assert!(registry.builders_added_or_removed());
    assert_eq!(registry.dirty_builders().len(), 1);
}

#[test]
fn dirtiness_tracks_new_changed_and_removed_builders() {
    let fs = MockFileSystem::new();
    let mut db = AssetDatabase::new();

    let first = registry(vec![scripted("texture", &fs), scripted("mesh", &fs)]).compute_builder_dirty(&mut db);
    assert_eq!(first.dirty_count(), 2);
    assert!(first.builders_added_or_removed);

    let unchanged = registry(vec![scripted("texture", &fs), scripted("mesh", &fs)]).compute_builder_dirty(&mut db);
    assert_eq!(unchanged.dirty_count(), 0);
    assert!(!unchanged.builders_added_or_removed);

    let mut bumped = registry(vec![scripted("texture", &fs).with_version("2"), scripted("mesh", &fs)]);
    let report = bumped.compute_builder_dirty(&mut db);
    let texture_id = bumped.get("texture").unwrap().descriptor().bus_id;
    assert_eq!(report.dirty.iter().collect::<Vec<_>>(), vec![&texture_id]);
    assert!(!report.builders_added_or_removed);
    assert!(bumped.is_builder_dirty(&texture_id));

    let removed = registry(vec![scripted("texture", &fs).with_version("2")]).compute_builder_dirty(&mut db);
    assert_eq!(removed.dirty_count(), 0);
    assert!(removed.builders_added_or_removed);
}

#[test]
fn registering_the_same_bus_id_replaces_the_builder() {
    let fs = MockFileSystem::new();
    let mut registry = registry(vec![scripted("texture", &fs)]);
    registry.register(Arc::new(scripted("texture", &fs).with_version("3")));

    assert_eq!(registry.iter().count(), 1);
    assert_eq!(registry.get("texture").unwrap().descriptor().version, "3");
}

async fn built_once(fs: &MockFileSystem) -> AssetDatabase {
    let cfg = texture_config();
    let (mut pipeline, _builder) = texture_pipeline(&cfg, fs);
    pipeline.scan();
    with_timeout(pipeline.settle()).await;
    pipeline.database().clone()
}

#[tokio::test]
async fn builder_version_bump_rebuilds_everything() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file(Path::new(GAME).join("rock.png"), "rock");
    let db = built_once(&fs).await;

    let builder = Arc::new(scripted("texture", &fs).with_version("2"));
    let mut pipeline = TestPipeline::with_database(
        &texture_config(),
        fs.clone(),
        vec![builder.clone() as Arc<dyn Builder>],
        db,
    );
    pipeline.scan();

    assert_eq!(with_timeout(pipeline.settle()).await, 2);
    assert_eq!(builder.create_jobs_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn analysis_fingerprint_change_reanalyzes_without_rebuilding() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file(Path::new(GAME).join("rock.png"), "rock");
    let db = built_once(&fs).await;

    let builder = Arc::new(scripted("texture", &fs).with_analysis_fingerprint("v2"));
    let mut pipeline = TestPipeline::with_database(
        &texture_config(),
        fs.clone(),
        vec![builder.clone() as Arc<dyn Builder>],
        db,
    );
    pipeline.scan();

    assert!(pipeline.pump().is_empty());
    assert_eq!(builder.create_jobs_calls(), 1);
    Ok(())
}
