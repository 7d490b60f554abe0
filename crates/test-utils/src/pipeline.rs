#![allow(dead_code)]

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use assetpipe::builder::Builder;
use assetpipe::config::ConfigFile;
use assetpipe::db::AssetDatabase;
use assetpipe::engine::{
    AssetNotification, AssetNotificationKind, Conductor, ConductorSettings, CoreCommand,
    Notification, RuntimeEvent, RuntimeOptions,
};
use assetpipe::exec::{run_job, JobDetails, JobOutcome, RcJob, RunnerSettings};
use assetpipe::fs::mock::MockFileSystem;
use assetpipe::fs::FileSystem;
use assetpipe::registry::{BuilderRegistry, ScanRegistry};

use crate::fake_executor::instant_runner_settings;

/// A conductor over a [`MockFileSystem`], driven synchronously by the test.
///
/// Dispatched jobs are either handed back to the test (`pump`) or run
/// through the real job runner (`settle`).
pub struct TestPipeline {
    pub fs: MockFileSystem,
    pub conductor: Conductor,
    pub runner: RunnerSettings,
    notifications: Vec<Notification>,
    dispatched: Vec<JobDetails>,
}

impl TestPipeline {
    pub fn new(cfg: &ConfigFile, fs: MockFileSystem, builders: Vec<Arc<dyn Builder>>) -> Self {
        Self::with_database(cfg, fs, builders, AssetDatabase::new())
    }

    pub fn with_database(
        cfg: &ConfigFile,
        fs: MockFileSystem,
        builders: Vec<Arc<dyn Builder>>,
        db: AssetDatabase,
    ) -> Self {
        let mut registry = BuilderRegistry::new();
        for builder in builders {
            registry.register(builder);
        }
        let scan = ScanRegistry::from_config(cfg).expect("valid scan registry");
        let shared: Arc<dyn FileSystem> = Arc::new(fs.clone());
        let conductor = Conductor::new(
            ConductorSettings::from_config(cfg),
            scan,
            registry,
            db,
            shared,
            RuntimeOptions::default(),
        );

        Self {
            runner: instant_runner_settings(&cfg.cache.root),
            fs,
            conductor,
            notifications: Vec::new(),
            dispatched: Vec::new(),
        }
    }

    pub fn scan(&mut self) {
        self.conductor.begin_initial_scan();
    }

    pub fn send(&mut self, event: RuntimeEvent) {
        self.conductor.enqueue(event);
    }

    /// Process until nothing is queued. Returns the jobs dispatched on the
    /// way without running them.
    pub fn pump(&mut self) -> Vec<RcJob> {
        let mut jobs = Vec::new();
        for command in self.conductor.drain() {
            match command {
                CoreCommand::Dispatch(batch) => {
                    self.dispatched
                        .extend(batch.iter().map(|j| j.details().clone()));
                    jobs.extend(batch);
                }
                CoreCommand::Publish(notification) => self.notifications.push(notification),
                CoreCommand::Persist | CoreCommand::RequestExit => {}
            }
        }
        jobs
    }

    /// Report a finished job and process the result.
    pub fn finish(&mut self, outcome: JobOutcome) -> Vec<RcJob> {
        self.send(RuntimeEvent::JobFinished(Box::new(outcome)));
        self.pump()
    }

    /// Run one job with the real job runner.
    pub async fn run(&self, job: RcJob) -> JobOutcome {
        let fs: Arc<dyn FileSystem> = Arc::new(self.fs.clone());
        run_job(job, fs, self.runner.clone(), CancellationToken::new()).await
    }

    /// Pump and run every dispatched job until the conductor is idle.
    /// Returns the number of jobs run.
    pub async fn settle(&mut self) -> usize {
        let mut ran = 0;
        for _ in 0..1000 {
            let jobs = self.pump();
            if jobs.is_empty() {
                return ran;
            }
            for job in jobs {
                let outcome = self.run(job).await;
                self.send(RuntimeEvent::JobFinished(Box::new(outcome)));
                ran += 1;
            }
        }
        panic!("pipeline did not settle");
    }

    pub fn database(&self) -> &AssetDatabase {
        self.conductor.database()
    }

    /// Every job dispatched so far.
    pub fn dispatched(&self) -> &[JobDetails] {
        &self.dispatched
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Drain notifications and keep the asset messages of `kind`.
    pub fn take_asset_messages(&mut self, kind: AssetNotificationKind) -> Vec<(String, AssetNotification)> {
        self.take_notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::AssetMessage { platform, message } if message.kind == kind => {
                    Some((platform, message))
                }
                _ => None,
            })
            .collect()
    }
}
