// tests/job_runner.rs

mod common;
use crate::common::fake_executor::instant_runner_settings;
use crate::common::init_tracing;
use crate::common::scripted_builder::{ScriptedBuilder, ScriptedProduct};

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use assetpipe::builder::{Builder, JobDescriptor};
use assetpipe::exec::{run_job, JobDetails, JobEntry, JobState, RcJob};
use assetpipe::fingerprint::{compute_file_hash, compute_fingerprint, FingerprintSpec};
use assetpipe::fs::mock::MockFileSystem;
use assetpipe::fs::{FileSystem, RealFileSystem};

type TestResult = Result<(), Box<dyn Error>>;

/// Details for a `Compile` job of `<root>/Game/<rel>` on `pc`.
fn details(root: &Path, rel: &str, fs: &dyn FileSystem) -> JobDetails {
    let full_path = root.join("Game").join(rel);
    let fingerprint = compute_fingerprint(
        &FingerprintSpec {
            source: &full_path,
            extra_info: "",
            fingerprint_files: &[],
        },
        |p| compute_file_hash(fs, p).ok(),
    );
    let product_dir = Path::new(rel)
        .parent()
        .map(|p| p.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    JobDetails {
        entry: JobEntry {
            source: rel.to_string(),
            platform: "pc".to_string(),
            job_key: "Compile".to_string(),
            builder_guid: Uuid::nil(),
        },
        builder_name: "texture".to_string(),
        relative_path: rel.to_string(),
        watch_folder: root.join("Game"),
        full_path,
        source_uuid: Uuid::nil(),
        descriptor: JobDescriptor::new("Compile", "pc"),
        fingerprint,
        extra_info: String::new(),
        fingerprint_files: Vec::new(),
        job_run_key: 7,
        critical: false,
        check_exclusive_lock: false,
        auto_fail: false,
        auto_succeed: false,
        fail_log: Vec::new(),
        product_root: root.join("Cache/pc/game"),
        product_prefix: "pc/game".to_string(),
        product_dir,
    }
}

fn mock_setup() -> (MockFileSystem, Arc<ScriptedBuilder>, PathBuf) {
    let root = PathBuf::from("/proj");
    let fs = MockFileSystem::new();
    fs.add_file(root.join("Game/textures/Rock.png"), "rock");
    let builder = Arc::new(ScriptedBuilder::new("texture", "*.png", Arc::new(fs.clone())));
    (fs, builder, root)
}

async fn run(fs: &MockFileSystem, builder: &Arc<ScriptedBuilder>, details: JobDetails) -> assetpipe::exec::JobOutcome {
    let settings = instant_runner_settings(Path::new("/proj/Cache"));
    let job = RcJob::new(details, builder.clone() as Arc<dyn Builder>);
    run_job(job, Arc::new(fs.clone()), settings, CancellationToken::new()).await
}

#[tokio::test]
async fn completed_job_places_products_in_lowercase() -> TestResult {
    init_tracing();
    let (fs, builder, root) = mock_setup();
    builder.set_products(
        "textures/Rock.png",
        vec![ScriptedProduct::new("Rock_Diffuse.DDS", 0), ScriptedProduct::new("Mips/Rock_1.dds", 1)],
    );

    let outcome = run(&fs, &builder, details(&root, "textures/Rock.png", &fs)).await;

    assert_eq!(outcome.state, JobState::Completed);
    let paths: Vec<&str> = outcome.products.iter().map(|p| p.cache_path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["pc/game/textures/rock_diffuse.dds", "pc/game/textures/mips/rock_1.dds"]
    );
    assert_eq!(outcome.products[0].relative_path, "textures/rock_diffuse.dds");
    for placed in outcome.products.iter() {
        assert!(fs.is_file(&placed.absolute_path));
        assert_eq!(placed.hash, compute_file_hash(&fs, &placed.absolute_path)?);
    }

    // Temp directories are cleaned up after a successful move.
    let temp_root = Path::new("/proj/Cache/assetpipe-tmp");
    assert!(fs.read_dir(temp_root).map(|e| e.is_empty()).unwrap_or(true));
    Ok(())
}

#[tokio::test]
async fn products_are_copied_when_rename_fails() -> TestResult {
    init_tracing();
    let (fs, builder, root) = mock_setup();
    fs.fail_renames(true);

    let outcome = run(&fs, &builder, details(&root, "textures/Rock.png", &fs)).await;

    assert_eq!(outcome.state, JobState::Completed);
    assert!(fs.is_file(Path::new("/proj/Cache/pc/game/textures/rock.png.out")));
    Ok(())
}

#[tokio::test]
async fn placement_failure_fails_the_job() -> TestResult {
    init_tracing();
    let (fs, builder, root) = mock_setup();
    fs.deny_writes_under("/proj/Cache/pc");

    let outcome = run(&fs, &builder, details(&root, "textures/Rock.png", &fs)).await;

    assert_eq!(outcome.state, JobState::Failed);
    assert!(outcome.products.is_empty());
    assert!(!outcome.messages.is_empty());
    Ok(())
}

#[tokio::test]
async fn builder_failure_is_reported() -> TestResult {
    init_tracing();
    let (fs, builder, root) = mock_setup();
    builder.fail_jobs("textures/Rock.png", true);

    let outcome = run(&fs, &builder, details(&root, "textures/Rock.png", &fs)).await;

    assert_eq!(outcome.state, JobState::Failed);
    assert_eq!(builder.process_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn auto_fail_job_skips_the_builder() -> TestResult {
    init_tracing();
    let (fs, builder, root) = mock_setup();
    let mut d = details(&root, "textures/Rock.png", &fs);
    d.auto_fail = true;
    d.fail_log = vec!["bad header".to_string()];

    let outcome = run(&fs, &builder, d).await;

    assert_eq!(outcome.state, JobState::Failed);
    assert_eq!(outcome.messages, vec!["bad header".to_string()]);
    assert_eq!(builder.process_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn auto_succeed_job_skips_the_builder() -> TestResult {
    init_tracing();
    let (fs, builder, root) = mock_setup();
    let mut d = details(&root, "textures/Rock.png", &fs);
    d.auto_succeed = true;

    let outcome = run(&fs, &builder, d).await;

    assert_eq!(outcome.state, JobState::Completed);
    assert!(outcome.products.is_empty());
    assert_eq!(builder.process_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn locked_source_times_out_as_cancelled() -> TestResult {
    init_tracing();
    let (fs, builder, root) = mock_setup();
    fs.set_locked("/proj/Game/textures/Rock.png", true);
    let mut d = details(&root, "textures/Rock.png", &fs);
    d.check_exclusive_lock = true;

    let outcome = run(&fs, &builder, d).await;

    assert_eq!(outcome.state, JobState::Cancelled);
    assert_eq!(builder.process_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn source_locked_on_disk_cancels_the_job() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    std::fs::create_dir_all(root.join("Game/textures"))?;
    let source = root.join("Game/textures/Rock.png");
    std::fs::write(&source, b"rock")?;

    let writer = std::fs::OpenOptions::new().read(true).write(true).open(&source)?;
    writer.lock_exclusive()?;

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let builder = Arc::new(ScriptedBuilder::new("texture", "*.png", fs.clone()));
    let mut d = details(root, "textures/Rock.png", fs.as_ref());
    d.check_exclusive_lock = true;

    let job = RcJob::new(d, builder.clone() as Arc<dyn Builder>);
    let outcome = run_job(
        job,
        fs,
        instant_runner_settings(&root.join("Cache")),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.state, JobState::Cancelled);
    assert_eq!(builder.process_calls(), 0);
    FileExt::unlock(&writer)?;
    Ok(())
}

#[tokio::test]
async fn quit_before_start_cancels() -> TestResult {
    init_tracing();
    let (fs, builder, root) = mock_setup();
    let quit = CancellationToken::new();
    quit.cancel();

    let job = RcJob::new(details(&root, "textures/Rock.png", &fs), builder.clone() as Arc<dyn Builder>);
    let outcome = run_job(
        job,
        Arc::new(fs.clone()),
        instant_runner_settings(Path::new("/proj/Cache")),
        quit,
    )
    .await;

    assert_eq!(outcome.state, JobState::Cancelled);
    assert_eq!(builder.process_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn settled_fingerprint_reflects_processed_content() -> TestResult {
    init_tracing();
    let (fs, builder, root) = mock_setup();
    let d = details(&root, "textures/Rock.png", &fs);
    let stale = d.fingerprint;

    fs.add_file("/proj/Game/textures/Rock.png", "rock, edited");
    let outcome = run(&fs, &builder, d).await;

    assert_eq!(outcome.state, JobState::Completed);
    assert_ne!(outcome.fingerprint, stale);
    Ok(())
}

#[test]
fn job_state_machine_rejects_invalid_transitions() {
    let (fs, builder, root) = mock_setup();
    let mut job = RcJob::new(details(&root, "textures/Rock.png", &fs), builder as Arc<dyn Builder>);

    assert!(job.finish(JobState::Completed).is_err());
    assert!(job.start().is_ok());
    assert!(job.start().is_err());
    assert!(job.finish(JobState::Processing).is_err());
    assert!(job.finish(JobState::Completed).is_ok());
    assert!(job.cancel().is_err());
    assert_eq!(job.state(), JobState::Completed);
}

#[tokio::test]
async fn products_land_on_a_real_disk() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    std::fs::create_dir_all(root.join("Game/textures"))?;
    std::fs::write(root.join("Game/textures/Rock.png"), b"rock")?;

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let builder = Arc::new(ScriptedBuilder::new("texture", "*.png", fs.clone()));
    let d = details(root, "textures/Rock.png", fs.as_ref());

    let job = RcJob::new(d, builder as Arc<dyn Builder>);
    let outcome = run_job(
        job,
        fs,
        instant_runner_settings(&root.join("Cache")),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.state, JobState::Completed);
    let placed = root.join("Cache/pc/game/textures/rock.png.out");
    assert_eq!(std::fs::read_to_string(placed)?, "rockpc");
    Ok(())
}
