// src/exec/backend.rs

//! Pluggable job executor abstraction.
//!
//! The runtime talks to a `JobExecutor` instead of a raw mpsc sender, so
//! tests can swap in a fake executor that records dispatched jobs and replies
//! with canned outcomes.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::RuntimeEvent;
use crate::errors::{Error, Result};
use crate::exec::executor_loop::{spawn_executor, ExecutorContext};
use crate::exec::job::RcJob;

/// Trait abstracting how dispatched jobs are executed.
pub trait JobExecutor: Send {
    /// Hand the given jobs over for execution. Each one must eventually be
    /// reported back as a `RuntimeEvent::JobFinished`.
    fn dispatch_jobs(&mut self, jobs: Vec<RcJob>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Set the global quit flag.
    fn request_quit(&mut self) {}
}

/// Real executor used in production, backed by [`spawn_executor`].
pub struct RealJobExecutor {
    tx: mpsc::Sender<RcJob>,
    quit: CancellationToken,
}

impl RealJobExecutor {
    /// Spawns the background executor loop immediately.
    pub fn new(ctx: ExecutorContext, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        let quit = CancellationToken::new();
        let tx = spawn_executor(ctx, runtime_tx, quit.clone());
        Self { tx, quit }
    }
}

impl JobExecutor for RealJobExecutor {
    fn dispatch_jobs(&mut self, jobs: Vec<RcJob>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();

        Box::pin(async move {
            for job in jobs {
                tx.send(job).await.map_err(|e| Error::msg(e.to_string()))?;
            }
            Ok(())
        })
    }

    fn request_quit(&mut self) {
        if !self.quit.is_cancelled() {
            info!("quit requested; cancelling jobs that have not started");
            self.quit.cancel();
        }
    }
}
