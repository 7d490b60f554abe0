// src/engine/runtime.rs

use std::fmt;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

use crate::db::StateStore;
use crate::errors::Result;
use crate::exec::{JobExecutor, RcJob};

use super::core::Conductor;
use super::{CoreCommand, Notification, RuntimeEvent};

/// Drives the [`Conductor`] in response to `RuntimeEvent`s and delegates
/// job execution to a [`JobExecutor`].
///
/// This is a pure IO shell: it reads events from the channel, executes the
/// commands the conductor returns, saves the database and publishes
/// notifications.
pub struct Runtime<E: JobExecutor> {
    core: Conductor,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    store: Box<dyn StateStore>,
    notifications: broadcast::Sender<Notification>,
}

impl<E: JobExecutor> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: JobExecutor> Runtime<E> {
    pub fn new(
        core: Conductor,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        store: Box<dyn StateStore>,
        notifications: broadcast::Sender<Notification>,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            store,
            notifications,
        }
    }

    /// Main event loop.
    ///
    /// - Runs the initial scan when `initial_scan` is set.
    /// - Processes queued work in batches, yielding between batches.
    /// - Waits for the next event when the conductor has nothing queued.
    ///
    /// Returns the conductor so callers can inspect the final state.
    pub async fn run(mut self, initial_scan: bool) -> Result<Conductor> {
        info!("assetpipe runtime started");
        if initial_scan {
            self.core.begin_initial_scan();
        }

        loop {
            let step = self.core.process();
            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("conductor requested exit; stopping runtime");
                break;
            }

            if step.has_more {
                tokio::task::yield_now().await;
            } else {
                match self.event_rx.recv().await {
                    Some(event) => {
                        debug!(?event, "runtime received event");
                        self.core.enqueue(event);
                    }
                    None => {
                        info!("runtime event channel closed; exiting");
                        break;
                    }
                }
            }
            self.drain_ready();
        }

        self.persist();
        info!("runtime exiting");
        Ok(self.core)
    }

    /// Move every event that is already waiting into the conductor.
    fn drain_ready(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            debug!(?event, "runtime received event");
            self.core.enqueue(event);
        }
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::Dispatch(jobs) => self.dispatch(jobs).await?,
            CoreCommand::Publish(notification) => {
                // No subscribers is fine.
                let _ = self.notifications.send(notification);
            }
            CoreCommand::Persist => self.persist(),
            CoreCommand::RequestExit => self.executor.request_quit(),
        }
        Ok(())
    }

    async fn dispatch(&mut self, jobs: Vec<RcJob>) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }
        let entries: Vec<String> = jobs.iter().map(|j| j.details().entry.to_string()).collect();
        debug!(?entries, "dispatching jobs");
        self.executor.dispatch_jobs(jobs).await
    }

    fn persist(&mut self) {
        if let Err(err) = self.store.save(self.core.database()) {
            error!(error = %format!("{err:#}"), "failed to save asset database");
        }
    }
}
