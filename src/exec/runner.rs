// src/exec/runner.rs

//! Runs a single job on a worker: pre-flight waits, builder dispatch and
//! product placement.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::builder::{JobProduct, ProcessJobRequest, ProcessJobResultCode};
use crate::config::ConfigFile;
use crate::exec::job::{JobDetails, JobOutcome, JobState, PlacedProduct, RcJob};
use crate::fingerprint::{compute_file_hash, compute_fingerprint, FingerprintSpec, FAILED_FINGERPRINT};
use crate::fs::FileSystem;
use crate::path_utils::{eq_ignore_case, normalize_path, strip_dir_prefix};

/// Timing and location settings shared by every job.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// A source modified more recently than this is waited on.
    pub grace_window: Duration,
    pub lock_timeout: Duration,
    pub settle_timeout: Duration,
    pub poll_interval: Duration,
    /// Parent of per-job temp directories.
    pub temp_root: PathBuf,
}

impl RunnerSettings {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            grace_window: Duration::from_millis(cfg.jobs.grace_window_ms),
            lock_timeout: Duration::from_millis(cfg.jobs.lock_timeout_ms),
            settle_timeout: Duration::from_millis(cfg.jobs.settle_timeout_ms),
            poll_interval: Duration::from_millis(cfg.jobs.poll_interval_ms.max(1)),
            temp_root: temp_root_for(&cfg.cache.root),
        }
    }
}

/// Directory under the cache root that holds job temp directories.
pub fn temp_root_for(cache_root: &Path) -> PathBuf {
    cache_root.join("assetpipe-tmp")
}

enum Preflight {
    Ready,
    Cancelled(&'static str),
}

/// Drive `job` to a terminal state.
///
/// `quit` is the global quit flag. It is checked at every wait point and
/// right before the builder is invoked; once the builder runs it is only
/// forwarded to it.
pub async fn run_job(
    mut job: RcJob,
    fs: Arc<dyn FileSystem>,
    settings: RunnerSettings,
    quit: CancellationToken,
) -> JobOutcome {
    let entry = job.details().entry.clone();
    let run_key = job.details().job_run_key;

    if quit.is_cancelled() {
        info!(job = %entry, run_key, "quit requested before job started");
        transition(&mut job, JobState::Cancelled);
        return job.into_outcome(Vec::new(), Vec::new());
    }

    if job.details().auto_fail {
        let lines = job.details().fail_log.clone();
        for line in lines.iter() {
            warn!(job = %entry, "{}", line);
        }
        transition(&mut job, JobState::Failed);
        return job.into_outcome(Vec::new(), lines);
    }

    if job.details().auto_succeed {
        debug!(job = %entry, run_key, "builder needs no work; completing without processing");
        transition(&mut job, JobState::Completed);
        return job.into_outcome(Vec::new(), Vec::new());
    }

    if let Err(err) = job.start() {
        error!(job = %entry, error = %err, "cannot start job");
        return job.into_outcome(Vec::new(), vec![err.to_string()]);
    }

    if let Preflight::Cancelled(reason) = preflight(&mut job, &fs, &settings, &quit).await {
        info!(job = %entry, run_key, reason, "job cancelled before processing");
        transition(&mut job, JobState::Cancelled);
        return job.into_outcome(Vec::new(), vec![reason.to_string()]);
    }

    let temp_dir = settings
        .temp_root
        .join(format!("job-{}-{}", run_key, Uuid::new_v4().simple()));
    if let Err(err) = fs.create_dir_all(&temp_dir) {
        error!(job = %entry, error = %err, "cannot create job temp directory");
        transition(&mut job, JobState::Failed);
        return job.into_outcome(Vec::new(), vec![format!("{err:#}")]);
    }

    if quit.is_cancelled() {
        info!(job = %entry, run_key, "quit requested before dispatch");
        remove_temp_dir(fs.as_ref(), &temp_dir);
        transition(&mut job, JobState::Cancelled);
        return job.into_outcome(Vec::new(), Vec::new());
    }

    let details = job.details().clone();
    let request = ProcessJobRequest {
        source_file: details.relative_path.clone(),
        full_path: details.full_path.clone(),
        watch_folder: details.watch_folder.clone(),
        platform: details.entry.platform.clone(),
        job: details.descriptor.clone(),
        temp_dir_path: temp_dir.clone(),
        source_uuid: details.source_uuid,
        job_run_key: run_key,
    };

    info!(job = %entry, run_key, builder = %details.builder_name, "processing job");
    let builder = Arc::clone(job.builder());
    let response = builder.process_job(request, quit.clone()).await;

    let state = match response.result_code {
        ProcessJobResultCode::Success => JobState::Completed,
        ProcessJobResultCode::Crashed => JobState::Crashed,
        ProcessJobResultCode::Cancelled => JobState::Cancelled,
        ProcessJobResultCode::Failed => JobState::Failed,
    };

    if state != JobState::Completed {
        if state == JobState::Cancelled {
            remove_temp_dir(fs.as_ref(), &temp_dir);
        } else {
            warn!(job = %entry, run_key, state = ?state, temp_dir = ?temp_dir, "builder did not succeed");
        }
        transition(&mut job, state);
        return job.into_outcome(Vec::new(), Vec::new());
    }

    match place_products(fs.as_ref(), &details, &temp_dir, response.output_products) {
        Ok(placed) => {
            remove_temp_dir(fs.as_ref(), &temp_dir);
            info!(job = %entry, run_key, products = placed.len(), "job completed");
            transition(&mut job, JobState::Completed);
            job.into_outcome(placed, Vec::new())
        }
        Err(err) => {
            error!(
                job = %entry,
                run_key,
                error = %format!("{err:#}"),
                temp_dir = ?temp_dir,
                "failed to place products; keeping temp directory"
            );
            transition(&mut job, JobState::Failed);
            job.into_outcome(Vec::new(), vec![format!("{err:#}")])
        }
    }
}

async fn preflight(
    job: &mut RcJob,
    fs: &Arc<dyn FileSystem>,
    settings: &RunnerSettings,
    quit: &CancellationToken,
) -> Preflight {
    let source = job.details().full_path.clone();

    if let Ok(modified) = fs.modified(&source) {
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        if age < settings.grace_window {
            let wait = settings.grace_window - age;
            debug!(source = ?source, wait_ms = wait.as_millis() as u64, "source modified recently; waiting");
            if !sleep_or_quit(wait, quit).await {
                return Preflight::Cancelled("quit requested during grace period");
            }
        }
    }

    if job.details().check_exclusive_lock {
        let started = Instant::now();
        while !fs.can_open_exclusive(&source) {
            if started.elapsed() >= settings.lock_timeout {
                return Preflight::Cancelled("timed out waiting for exclusive access to source");
            }
            if !sleep_or_quit(settings.poll_interval, quit).await {
                return Preflight::Cancelled("quit requested while waiting for exclusive access");
            }
        }
    }

    let started = Instant::now();
    let mut last = job.details().fingerprint;
    loop {
        if quit.is_cancelled() {
            return Preflight::Cancelled("quit requested while fingerprint was settling");
        }
        let current = recompute_fingerprint(Arc::clone(fs), job.details()).await;
        if current == last {
            break;
        }
        debug!(source = ?source, previous = last, current, "fingerprint still changing");
        if started.elapsed() >= settings.settle_timeout {
            return Preflight::Cancelled("fingerprint did not settle");
        }
        last = current;
        if !sleep_or_quit(settings.poll_interval, quit).await {
            return Preflight::Cancelled("quit requested while fingerprint was settling");
        }
    }
    job.details_mut().fingerprint = last;

    Preflight::Ready
}

/// Sleep for `duration`; false if quit was requested first.
async fn sleep_or_quit(duration: Duration, quit: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = quit.cancelled() => false,
    }
}

async fn recompute_fingerprint(fs: Arc<dyn FileSystem>, details: &JobDetails) -> u64 {
    let source = details.full_path.clone();
    let extra_info = details.extra_info.clone();
    let files = details.fingerprint_files.clone();

    tokio::task::spawn_blocking(move || {
        let spec = FingerprintSpec {
            source: &source,
            extra_info: &extra_info,
            fingerprint_files: &files,
        };
        compute_fingerprint(&spec, |path| compute_file_hash(fs.as_ref(), path).ok())
    })
    .await
    .unwrap_or(FAILED_FINGERPRINT)
}

fn transition(job: &mut RcJob, state: JobState) {
    let result = match state {
        JobState::Cancelled => job.cancel(),
        _ if job.state() == JobState::Pending => job.start().and_then(|_| job.finish(state)),
        _ => job.finish(state),
    };
    if let Err(err) = result {
        error!(error = %err, "invalid job state transition");
    }
}

fn remove_temp_dir(fs: &dyn FileSystem, temp_dir: &Path) {
    if let Err(err) = fs.remove_dir_all(temp_dir) {
        warn!(temp_dir = ?temp_dir, error = %err, "failed to remove job temp directory");
    }
}

fn join_rel(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Where a reported product comes from, where it goes (relative to the
/// product root), and whether it may be moved rather than copied.
fn resolve_product(details: &JobDetails, temp_dir: &Path, product: &JobProduct) -> (PathBuf, String, bool) {
    let reported = &product.product_file_name;
    let temp = normalize_path(temp_dir);
    let root = normalize_path(&details.product_root);

    if reported.is_relative() {
        let rel = normalize_path(reported).to_lowercase();
        return (temp_dir.join(reported), join_rel(&details.product_dir, &rel), true);
    }

    let absolute = normalize_path(reported);
    if let Some(rel) = strip_dir_prefix(&absolute, &temp) {
        return (
            reported.clone(),
            join_rel(&details.product_dir, &rel.to_lowercase()),
            true,
        );
    }
    if let Some(rel) = strip_dir_prefix(&absolute, &root) {
        return (reported.clone(), rel.to_lowercase(), false);
    }

    let name = reported
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    (reported.clone(), join_rel(&details.product_dir, &name), false)
}

/// Move (or copy) every product into the cache. Any failure aborts placement.
fn place_products(
    fs: &dyn FileSystem,
    details: &JobDetails,
    temp_dir: &Path,
    products: Vec<JobProduct>,
) -> Result<Vec<PlacedProduct>> {
    let mut placed = Vec::with_capacity(products.len());

    for product in products {
        let (source, relative_path, inside_temp) = resolve_product(details, temp_dir, &product);
        let dest = details.product_root.join(&relative_path);

        let already_in_place = eq_ignore_case(&normalize_path(&source), &normalize_path(&dest));
        if !already_in_place {
            if let Some(parent) = dest.parent() {
                fs.create_dir_all(parent)?;
            }
            if inside_temp {
                if let Err(err) = fs.rename(&source, &dest) {
                    debug!(error = %err, "move failed; copying product instead");
                    fs.copy(&source, &dest)
                        .with_context(|| format!("placing product {:?}", dest))?;
                }
            } else {
                fs.copy(&source, &dest)
                    .with_context(|| format!("placing product {:?}", dest))?;
            }
        }

        let hash = compute_file_hash(fs, &dest)?;
        placed.push(PlacedProduct {
            cache_path: join_rel(&details.product_prefix, &relative_path),
            relative_path,
            absolute_path: dest,
            hash,
            product,
        });
    }

    Ok(placed)
}
