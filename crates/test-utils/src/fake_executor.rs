use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use assetpipe::engine::RuntimeEvent;
use assetpipe::errors::Result;
use assetpipe::exec::{run_job, JobDetails, JobExecutor, JobOutcome, JobState, RcJob, RunnerSettings};
use assetpipe::fs::FileSystem;

/// Runner settings without grace period and with short timeouts.
pub fn instant_runner_settings(cache_root: &Path) -> RunnerSettings {
    RunnerSettings {
        grace_window: Duration::ZERO,
        lock_timeout: Duration::from_millis(50),
        settle_timeout: Duration::from_millis(50),
        poll_interval: Duration::from_millis(1),
        temp_root: assetpipe::exec::temp_root_for(cache_root),
    }
}

enum Mode {
    /// Only record; the test reports outcomes itself.
    Record,
    /// Reply with a completed outcome without products.
    Complete,
    /// Run the job inline with the real job runner.
    Run {
        fs: Arc<dyn FileSystem>,
        settings: RunnerSettings,
    },
}

/// A fake executor that:
/// - records which jobs were dispatched
/// - optionally reports a `JobFinished` event for each one.
pub struct FakeJobExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    dispatched: Arc<Mutex<Vec<JobDetails>>>,
    quit: CancellationToken,
    mode: Mode,
}

impl FakeJobExecutor {
    pub fn recording(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self::with_mode(runtime_tx, Mode::Record)
    }

    pub fn completing(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self::with_mode(runtime_tx, Mode::Complete)
    }

    pub fn running(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        fs: Arc<dyn FileSystem>,
        settings: RunnerSettings,
    ) -> Self {
        Self::with_mode(runtime_tx, Mode::Run { fs, settings })
    }

    fn with_mode(runtime_tx: mpsc::Sender<RuntimeEvent>, mode: Mode) -> Self {
        Self {
            runtime_tx,
            dispatched: Arc::new(Mutex::new(Vec::new())),
            quit: CancellationToken::new(),
            mode,
        }
    }

    /// Shared log of dispatched jobs, in dispatch order.
    pub fn dispatched(&self) -> Arc<Mutex<Vec<JobDetails>>> {
        Arc::clone(&self.dispatched)
    }
}

impl JobExecutor for FakeJobExecutor {
    fn dispatch_jobs(&mut self, jobs: Vec<RcJob>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let dispatched = Arc::clone(&self.dispatched);
        let quit = self.quit.clone();

        Box::pin(async move {
            for job in jobs {
                dispatched.lock().unwrap().push(job.details().clone());

                let outcome = match &self.mode {
                    Mode::Record => continue,
                    Mode::Complete => {
                        JobOutcome::without_products(job.details().clone(), JobState::Completed)
                    }
                    Mode::Run { fs, settings } => {
                        run_job(job, Arc::clone(fs), settings.clone(), quit.clone()).await
                    }
                };

                tx.send(RuntimeEvent::JobFinished(Box::new(outcome)))
                    .await
                    .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }

    fn request_quit(&mut self) {
        self.quit.cancel();
    }
}
