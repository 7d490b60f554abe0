// tests/conductor_dependencies.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, RecognizerBuilder};
use crate::common::{init_tracing, texture_config, texture_pipeline, with_timeout, CACHE, GAME};

use std::error::Error;
use std::path::{Path, PathBuf};

use assetpipe::builder::SourceFileDependency;
use assetpipe::dag::DependencyTarget;
use assetpipe::db::source_uuid;
use assetpipe::engine::RuntimeEvent;
use assetpipe::fs::mock::MockFileSystem;
use assetpipe::types::DependencyType;

type TestResult = Result<(), Box<dyn Error>>;

fn game(rel: &str) -> PathBuf {
    Path::new(GAME).join(rel)
}

#[tokio::test]
async fn changing_a_dependency_rebuilds_its_dependents() -> TestResult {
    init_tracing();

    let fs = MockFileSystem::new();
    fs.add_file(game("textures/Rock.png"), "rock");
    fs.add_file(game("textures/shared.pal"), "palette v1");
    let cfg = texture_config();
    let (mut pipeline, builder) = texture_pipeline(&cfg, &fs);
    builder.set_dependencies(
        "textures/Rock.png",
        vec![SourceFileDependency::by_path("textures/shared.pal")],
    );

    pipeline.scan();
    assert_eq!(with_timeout(pipeline.settle()).await, 2);

    // The palette has no recognizer but is registered as a dependency.
    let db = pipeline.database();
    assert!(db.source_by_name("textures/shared.pal").is_some());
    let deps = db.dependencies.dependencies_of("textures/Rock.png");
    assert_eq!(deps.len(), 1);
    assert_eq!(
        deps[0].target,
        DependencyTarget::Resolved("textures/shared.pal".to_string())
    );

    fs.add_file(game("textures/shared.pal"), "palette v2");
    pipeline.send(RuntimeEvent::FileModified(game("textures/shared.pal")));
    let jobs = pipeline.pump();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.details().source() == "textures/Rock.png"));
    assert!(jobs[0]
        .details()
        .fingerprint_files
        .contains(&game("textures/shared.pal")));
    Ok(())
}

#[tokio::test]
async fn placeholder_resolves_when_the_file_appears() -> TestResult {
    init_tracing();

    let fs = MockFileSystem::new();
    fs.add_file(game("textures/Rock.png"), "rock");
    let cfg = texture_config();
    let (mut pipeline, builder) = texture_pipeline(&cfg, &fs);
    builder.set_dependencies(
        "textures/Rock.png",
        vec![SourceFileDependency::by_path("textures/later.pal")],
    );

    pipeline.scan();
    with_timeout(pipeline.settle()).await;

    let deps = pipeline.database().dependencies.dependencies_of("textures/Rock.png");
    assert_eq!(deps.len(), 1);
    assert!(deps[0].target.is_placeholder());

    fs.add_file(game("textures/later.pal"), "palette");
    pipeline.send(RuntimeEvent::FileAdded(game("textures/later.pal")));
    let jobs = pipeline.pump();

    let db = pipeline.database();
    assert!(db.source_by_name("textures/later.pal").is_some());
    let deps = db.dependencies.dependencies_of("textures/Rock.png");
    assert_eq!(
        deps[0].target,
        DependencyTarget::Resolved("textures/later.pal".to_string())
    );
    assert_eq!(jobs.len(), 2, "the new file enters the fingerprint");
    Ok(())
}

#[tokio::test]
async fn uuid_dependency_resolves_when_the_source_registers() -> TestResult {
    init_tracing();

    let fs = MockFileSystem::new();
    fs.add_file(game("a.png"), "a");
    let cfg = texture_config();
    let (mut pipeline, builder) = texture_pipeline(&cfg, &fs);
    builder.set_dependencies("a.png", vec![SourceFileDependency::by_uuid(source_uuid("b.png"))]);

    pipeline.scan();
    with_timeout(pipeline.settle()).await;
    let deps = pipeline.database().dependencies.dependencies_of("a.png");
    assert_eq!(deps[0].target, DependencyTarget::PendingUuid(source_uuid("b.png")));

    fs.add_file(game("b.png"), "b");
    pipeline.send(RuntimeEvent::FileAdded(game("b.png")));
    with_timeout(pipeline.settle()).await;

    let deps = pipeline.database().dependencies.dependencies_of("a.png");
    assert_eq!(deps[0].target, DependencyTarget::Resolved("b.png".to_string()));
    Ok(())
}

#[tokio::test]
async fn deleting_a_dependency_reverts_the_edge_and_requeues() -> TestResult {
    init_tracing();

    let fs = MockFileSystem::new();
    fs.add_file(game("a.png"), "a");
    fs.add_file(game("b.png"), "b");
    let cfg = texture_config();
    let (mut pipeline, builder) = texture_pipeline(&cfg, &fs);
    builder.set_dependencies("a.png", vec![SourceFileDependency::by_path("b.png")]);

    pipeline.scan();
    with_timeout(pipeline.settle()).await;

    fs.remove(game("b.png"));
    pipeline.send(RuntimeEvent::FileDeleted(game("b.png")));
    let jobs = pipeline.pump();

    let db = pipeline.database();
    assert!(db.source_by_name("b.png").is_none());
    let deps = db.dependencies.dependencies_of("a.png");
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].target, DependencyTarget::PendingPath("b.png".to_string()));

    // a.png lost a fingerprint input and is rebuilt.
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.details().source() == "a.png"));
    Ok(())
}

#[tokio::test]
async fn job_dependencies_are_recorded_as_job_edges() -> TestResult {
    init_tracing();

    let fs = MockFileSystem::new();
    fs.add_file(game("a.png"), "a");
    fs.add_file(game("b.png"), "b");
    let cfg = texture_config();
    let (mut pipeline, builder) = texture_pipeline(&cfg, &fs);
    let mut dep = SourceFileDependency::by_path("b.png");
    dep.dependency_type = DependencyType::JobToJob;
    builder.set_dependencies("a.png", vec![dep]);

    pipeline.scan();
    with_timeout(pipeline.settle()).await;

    let deps = pipeline.database().dependencies.dependencies_of("a.png");
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].dependency_type, DependencyType::JobToJob);
    Ok(())
}

#[tokio::test]
async fn sidecar_change_reprocesses_its_source() -> TestResult {
    init_tracing();

    let fs = MockFileSystem::new();
    fs.add_file(game("textures/Rock.png"), "rock");
    fs.add_file(game("textures/Rock.png.assetinfo"), "compression=high");
    let cfg = ConfigFileBuilder::new(CACHE)
        .with_platforms(&["pc"])
        .scan_folder(GAME, "game", 0)
        .with_recognizer("textures", RecognizerBuilder::new("*.png", "texture").platform("pc", "").build())
        .with_metadata("assetinfo", "")
        .build();
    let (mut pipeline, _builder) = texture_pipeline(&cfg, &fs);

    pipeline.scan();
    assert_eq!(with_timeout(pipeline.settle()).await, 1);
    assert_eq!(pipeline.database().sources().count(), 1);

    fs.add_file(game("textures/Rock.png.assetinfo"), "compression=low");
    pipeline.send(RuntimeEvent::FileModified(game("textures/Rock.png.assetinfo")));
    let jobs = pipeline.pump();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].details().source(), "textures/Rock.png");
    Ok(())
}

#[tokio::test]
async fn deleting_a_folder_removes_every_source_below_it() -> TestResult {
    init_tracing();

    let fs = MockFileSystem::new();
    fs.add_file(game("textures/a.png"), "a");
    fs.add_file(game("textures/b.png"), "b");
    fs.add_file(game("other.png"), "c");
    let cfg = texture_config();
    let (mut pipeline, _builder) = texture_pipeline(&cfg, &fs);

    pipeline.scan();
    with_timeout(pipeline.settle()).await;
    assert_eq!(pipeline.database().sources().count(), 3);

    fs.remove(game("textures"));
    pipeline.send(RuntimeEvent::FileDeleted(game("textures")));
    pipeline.pump();

    let db = pipeline.database();
    assert_eq!(db.sources().count(), 1);
    assert!(db.source_by_name("other.png").is_some());
    Ok(())
}

#[tokio::test]
async fn added_folder_is_scanned() -> TestResult {
    init_tracing();

    let fs = MockFileSystem::new();
    fs.add_dir(GAME);
    let cfg = texture_config();
    let (mut pipeline, _builder) = texture_pipeline(&cfg, &fs);
    pipeline.scan();
    assert!(pipeline.pump().is_empty());

    fs.add_file(game("new/a.png"), "a");
    fs.add_file(game("new/deeper/b.png"), "b");
    pipeline.send(RuntimeEvent::FileAdded(game("new")));
    let jobs = pipeline.pump();
    assert_eq!(jobs.len(), 4);
    Ok(())
}
