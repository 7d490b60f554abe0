// src/exec/executor_loop.rs

//! Main executor loop that runs jobs on a bounded set of workers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::RuntimeEvent;
use crate::exec::job::{JobEntry, JobOutcome, JobState, RcJob};
use crate::exec::runner::{run_job, RunnerSettings};
use crate::fs::FileSystem;

/// Shared state handed to every worker.
#[derive(Debug, Clone)]
pub struct ExecutorContext {
    pub fs: Arc<dyn FileSystem>,
    pub settings: RunnerSettings,
    pub max_concurrent: usize,
}

/// Number of concurrent workers: the machine's parallelism clamped to the
/// configured `[min, max]`.
pub fn effective_concurrency(min: usize, max: usize) -> usize {
    let max = max.max(1);
    let min = min.clamp(1, max);
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    available.clamp(min, max)
}

/// Internal handle for a job that has been handed to a worker.
struct ActiveJob {
    entry: JobEntry,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// Every received job gets its own Tokio task, which waits for a worker
/// permit, runs the job and reports a `JobFinished` event. A worker that
/// panics is reported as `Terminated`. Cancelling `quit` makes every job
/// that has not reached its builder yet finish as `Cancelled`.
pub fn spawn_executor(
    ctx: ExecutorContext,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    quit: CancellationToken,
) -> mpsc::Sender<RcJob> {
    let (tx, mut rx) = mpsc::channel::<RcJob>(256);

    tokio::spawn(async move {
        info!(workers = ctx.max_concurrent, "executor loop started");

        let permits = Arc::new(Semaphore::new(ctx.max_concurrent.max(1)));
        let mut active: HashMap<u64, ActiveJob> = HashMap::new();

        while let Some(job) = rx.recv().await {
            active.retain(|_, a| !a.handle.is_finished());
            handle_job(job, &ctx, &permits, &mut active, &runtime_tx, &quit);
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

fn handle_job(
    job: RcJob,
    ctx: &ExecutorContext,
    permits: &Arc<Semaphore>,
    active: &mut HashMap<u64, ActiveJob>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    quit: &CancellationToken,
) {
    let entry = job.details().entry.clone();
    let run_key = job.details().job_run_key;

    if let Some(existing) = active.values().find(|a| a.entry == entry) {
        warn!(
            job = %existing.entry,
            run_key,
            "a job for the same source, platform and key is still running"
        );
    }

    let details = job.details().clone();
    let fs = Arc::clone(&ctx.fs);
    let settings = ctx.settings.clone();
    let permits = Arc::clone(permits);
    let rt_tx = runtime_tx.clone();
    let quit = quit.clone();

    let handle = tokio::spawn(async move {
        let permit = permits.acquire_owned().await;
        if permit.is_err() {
            debug!(run_key, "worker pool closed");
        }

        let worker = tokio::spawn(run_job(job, fs, settings, quit));
        let outcome = match worker.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(job = %details.entry, run_key, error = %err, "job worker terminated");
                JobOutcome::without_products(details, JobState::Terminated)
            }
        };
        drop(permit);

        if rt_tx
            .send(RuntimeEvent::JobFinished(Box::new(outcome)))
            .await
            .is_err()
        {
            debug!(run_key, "runtime channel closed; dropping job result");
        }
    });

    active.insert(run_key, ActiveJob { entry, handle });
}
