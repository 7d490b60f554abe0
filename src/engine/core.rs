// src/engine/core.rs

//! Synchronous conductor.
//!
//! [`Conductor`] consumes [`RuntimeEvent`]s and produces:
//! - an updated database, dependency store and in-flight job set
//! - a list of [`CoreCommand`]s describing what the IO shell should do next
//!
//! It performs file system reads through the [`FileSystem`] seam (hashing,
//! directory listings, product cleanup) but owns no channels and no Tokio
//! types, so it can be driven step by step from tests with a mock file
//! system.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::db::{AssetDatabase, SourceId};
use crate::engine::{scan, Notification, RuntimeEvent, RuntimeOptions};
use crate::exec::{temp_root_for, JobEntry, JobOutcome, RcJob};
use crate::fingerprint::FileCache;
use crate::fs::FileSystem;
use crate::path_utils::{eq_ignore_case, name_key, normalize_path, strip_dir_prefix};
use crate::registry::{BuilderRegistry, ScanRegistry};

/// Files assessed per processing pass.
pub const DEFAULT_BATCH_LIMIT: usize = 50;

/// Commands that the IO shell should execute as a result of a core step.
#[derive(Debug)]
pub enum CoreCommand {
    /// Hand these jobs to the executor.
    Dispatch(Vec<RcJob>),
    Publish(Notification),
    /// Save the database.
    Persist,
    /// Stop accepting work and cancel jobs that have not started.
    RequestExit,
}

/// Result of a core step: commands and whether to keep running.
#[derive(Debug)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    pub keep_running: bool,
    /// Queued files remain after the batch limit was reached.
    pub has_more: bool,
}

impl CoreStep {
    /// Jobs dispatched by this step.
    pub fn jobs(&self) -> Vec<&RcJob> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::Dispatch(jobs) => Some(jobs.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Notifications published by this step.
    pub fn notifications(&self) -> Vec<&Notification> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::Publish(n) => Some(n),
                _ => None,
            })
            .collect()
    }
}

/// Where products go and how many files a pass may assess.
#[derive(Debug, Clone)]
pub struct ConductorSettings {
    pub cache_root: PathBuf,
    pub game: String,
    pub batch_limit: usize,
}

impl ConductorSettings {
    pub fn new(cache_root: impl Into<PathBuf>, game: &str) -> Self {
        Self {
            cache_root: cache_root.into(),
            game: game.to_string(),
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(cfg.cache.root.clone(), &cfg.cache.game)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileEventKind {
    /// Found by the initial scan; eligible for fast analysis.
    Scanned,
    Added,
    Modified,
    Deleted,
}

impl FileEventKind {
    /// Kind kept when `newer` arrives for a file already queued as `self`.
    fn merge(self, newer: FileEventKind) -> FileEventKind {
        match (self, newer) {
            (_, FileEventKind::Deleted) => FileEventKind::Deleted,
            (FileEventKind::Deleted, _) => FileEventKind::Modified,
            (FileEventKind::Scanned, FileEventKind::Scanned) => FileEventKind::Scanned,
            (FileEventKind::Added, FileEventKind::Scanned) => FileEventKind::Added,
            _ => FileEventKind::Modified,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct QueuedFile {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

/// Output collected while processing one pass.
#[derive(Debug, Default)]
struct PendingOutput {
    jobs: Vec<RcJob>,
    notifications: Vec<Notification>,
}

/// The conductor.
///
/// This owns:
/// - the scan folder / recognizer registry and the builder registry
/// - the asset database (sources, jobs, products, dependency edges)
/// - the file event queue and the set of in-flight jobs
#[derive(Debug)]
pub struct Conductor {
    pub(crate) settings: ConductorSettings,
    pub(crate) registry: ScanRegistry,
    pub(crate) builders: BuilderRegistry,
    pub(crate) db: AssetDatabase,
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) file_cache: FileCache,
    options: RuntimeOptions,

    queue: VecDeque<String>,
    queued: HashMap<String, QueuedFile>,
    finished: VecDeque<JobOutcome>,

    in_flight: HashMap<JobEntry, u64>,
    in_flight_sources: HashMap<String, usize>,
    /// Events for sources with jobs in flight, replayed when they finish.
    deferred: HashMap<String, QueuedFile>,

    next_run_key: u64,
    idle_reported: Option<bool>,
    quit_requested: bool,
    pub(crate) dirty: bool,
    out: PendingOutput,
}

impl Conductor {
    /// Build the conductor. Builder dirtiness is computed against the
    /// database here, and sources of scan folders that are no longer
    /// configured are dropped.
    pub fn new(
        settings: ConductorSettings,
        registry: ScanRegistry,
        mut builders: BuilderRegistry,
        mut db: AssetDatabase,
        fs: Arc<dyn FileSystem>,
        options: RuntimeOptions,
    ) -> Self {
        builders.compute_builder_dirty(&mut db);
        for folder in registry.scan_folders.folders() {
            db.upsert_scan_folder(folder);
        }

        let mut conductor = Self {
            settings,
            registry,
            builders,
            db,
            fs,
            file_cache: FileCache::new(),
            options,
            queue: VecDeque::new(),
            queued: HashMap::new(),
            finished: VecDeque::new(),
            in_flight: HashMap::new(),
            in_flight_sources: HashMap::new(),
            deferred: HashMap::new(),
            next_run_key: 0,
            idle_reported: None,
            quit_requested: false,
            dirty: true,
            out: PendingOutput::default(),
        };
        conductor.purge_orphaned_sources();
        conductor
    }

    pub fn database(&self) -> &AssetDatabase {
        &self.db
    }

    pub fn registry(&self) -> &ScanRegistry {
        &self.registry
    }

    pub fn builders(&self) -> &BuilderRegistry {
        &self.builders
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.finished.is_empty() && self.in_flight.is_empty()
    }

    /// Queue every file of every scan folder as found by the initial scan,
    /// plus a deletion for every known source that is gone from disk.
    pub fn begin_initial_scan(&mut self) {
        let files = scan::collect_files(
            self.fs.as_ref(),
            self.registry.scan_folders.folders(),
            &self.settings.cache_root,
        );
        info!(files = files.len(), "initial scan");
        for file in files {
            self.queue_file(file, FileEventKind::Scanned);
        }

        let missing: Vec<PathBuf> = self
            .db
            .sources()
            .filter_map(|s| self.db.absolute_path_of(s))
            .filter(|p| !self.fs.is_file(p))
            .collect();
        for path in missing {
            debug!(path = ?path, "known source missing on disk");
            self.queue_file(path, FileEventKind::Deleted);
        }
    }

    /// Record an event without processing it.
    pub fn enqueue(&mut self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::FileAdded(path) => self.queue_file(path, FileEventKind::Added),
            RuntimeEvent::FileModified(path) => self.queue_file(path, FileEventKind::Modified),
            RuntimeEvent::FileDeleted(path) => self.queue_file(path, FileEventKind::Deleted),
            RuntimeEvent::JobFinished(outcome) => self.finished.push_back(*outcome),
            RuntimeEvent::ShutdownRequested => {
                info!("shutdown requested");
                self.quit_requested = true;
            }
        }
    }

    /// Handle a single runtime event and process one batch.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        self.enqueue(event);
        self.process()
    }

    /// Process finished jobs and up to `batch_limit` queued files.
    pub fn process(&mut self) -> CoreStep {
        if self.quit_requested {
            let mut commands = Vec::new();
            if self.dirty {
                self.dirty = false;
                commands.push(CoreCommand::Persist);
            }
            commands.push(CoreCommand::RequestExit);
            return CoreStep {
                commands,
                keep_running: false,
                has_more: false,
            };
        }

        while let Some(outcome) = self.finished.pop_front() {
            self.handle_job_finished(outcome);
        }

        let mut assessed = 0;
        while assessed < self.settings.batch_limit {
            let Some(key) = self.queue.pop_front() else {
                break;
            };
            let Some(file) = self.queued.remove(&key) else {
                continue;
            };
            self.assess(file);
            assessed += 1;
        }

        let mut commands = Vec::new();
        let out = std::mem::take(&mut self.out);
        for notification in out.notifications {
            commands.push(CoreCommand::Publish(notification));
        }
        if !out.jobs.is_empty() {
            let mut jobs = out.jobs;
            // Critical first, then by builder priority.
            jobs.sort_by(|a, b| {
                let (a, b) = (a.details(), b.details());
                b.critical
                    .cmp(&a.critical)
                    .then_with(|| b.descriptor.priority.cmp(&a.descriptor.priority))
            });
            commands.push(CoreCommand::Dispatch(jobs));
        }
        if self.dirty {
            self.dirty = false;
            commands.push(CoreCommand::Persist);
        }

        let idle = self.is_idle();
        if self.idle_reported != Some(idle) {
            debug!(idle, "idle state changed");
            self.idle_reported = Some(idle);
            commands.push(CoreCommand::Publish(Notification::IdleState(idle)));
        }

        let keep_running = !(idle && self.options.exit_when_idle);
        if !keep_running {
            info!("idle; exiting");
            commands.push(CoreCommand::RequestExit);
        }

        CoreStep {
            commands,
            keep_running,
            has_more: !self.queue.is_empty(),
        }
    }

    /// Run passes until no queued file is left and collect every command.
    pub fn drain(&mut self) -> Vec<CoreCommand> {
        let mut commands = Vec::new();
        loop {
            let step = self.process();
            commands.extend(step.commands);
            if !step.has_more || !step.keep_running {
                return commands;
            }
        }
    }

    // ---- queue ----

    pub(crate) fn queue_file(&mut self, path: PathBuf, kind: FileEventKind) {
        if kind == FileEventKind::Deleted {
            self.file_cache.invalidate_under(&path);
        }
        self.file_cache.invalidate(&path);

        let key = normalize_path(&path).to_lowercase();
        match self.queued.get_mut(&key) {
            Some(existing) => {
                existing.kind = existing.kind.merge(kind);
                existing.path = path;
            }
            None => {
                self.queued.insert(key.clone(), QueuedFile { path, kind });
                self.queue.push_back(key);
            }
        }
    }

    /// Queue a re-assessment of every named source.
    pub(crate) fn requeue_sources(&mut self, names: BTreeSet<String>) {
        for name in names {
            let Some(path) = self
                .db
                .source_by_name(&name)
                .and_then(|s| self.db.absolute_path_of(s))
            else {
                continue;
            };
            debug!(source = %name, "re-queueing dependent source");
            self.queue_file(path, FileEventKind::Modified);
        }
    }

    // ---- in-flight jobs ----

    pub(crate) fn has_jobs_in_flight(&self, source: &str) -> bool {
        self.in_flight_sources
            .get(&name_key(source))
            .is_some_and(|n| *n > 0)
    }

    /// Park `file` until the jobs of `source` have finished.
    pub(crate) fn defer(&mut self, source: &str, file: QueuedFile) {
        debug!(source = %source, "jobs in flight; deferring event");
        let key = name_key(source);
        match self.deferred.get_mut(&key) {
            Some(existing) => {
                existing.kind = existing.kind.merge(file.kind);
                existing.path = file.path;
            }
            None => {
                self.deferred.insert(key, file);
            }
        }
    }

    pub(crate) fn dispatch_job(&mut self, mut job: RcJob) {
        self.next_run_key += 1;
        job.details_mut().job_run_key = self.next_run_key;

        let entry = job.details().entry.clone();
        if self.in_flight.contains_key(&entry) {
            warn!(job = %entry, "job already in flight; not dispatching again");
            return;
        }
        self.in_flight.insert(entry.clone(), self.next_run_key);
        *self
            .in_flight_sources
            .entry(name_key(&entry.source))
            .or_insert(0) += 1;

        debug!(job = %entry, run_key = self.next_run_key, "dispatching job");
        self.publish(Notification::AssetToProcess(job.details().clone()));
        self.out.jobs.push(job);
    }

    /// Drop `entry` from the in-flight set. Returns false for a result that
    /// does not belong to the current run of the job.
    pub(crate) fn finish_in_flight(&mut self, entry: &JobEntry, run_key: u64) -> bool {
        if self.in_flight.get(entry) != Some(&run_key) {
            return false;
        }
        self.in_flight.remove(entry);

        let key = name_key(&entry.source);
        let remaining = match self.in_flight_sources.get_mut(&key) {
            Some(n) => {
                *n = n.saturating_sub(1);
                *n
            }
            None => 0,
        };
        if remaining == 0 {
            self.in_flight_sources.remove(&key);
            if let Some(file) = self.deferred.remove(&key) {
                debug!(source = %entry.source, "replaying deferred event");
                self.queue_file(file.path, file.kind);
            }
        }
        true
    }

    pub(crate) fn publish(&mut self, notification: Notification) {
        self.out.notifications.push(notification);
    }

    // ---- paths ----

    /// Whether `path` lies inside the cache root.
    pub(crate) fn cache_relative(&self, path: &Path) -> Option<String> {
        let cache = normalize_path(&self.settings.cache_root);
        let normalized = normalize_path(path);
        if eq_ignore_case(&normalized, &cache) {
            return Some(String::new());
        }
        strip_dir_prefix(&normalized, &cache).map(|s| s.to_string())
    }

    pub(crate) fn temp_root(&self) -> PathBuf {
        temp_root_for(&self.settings.cache_root)
    }

    /// `(absolute product root, cache-relative prefix)` for a platform.
    /// Root scan folders place products directly below the platform folder.
    pub(crate) fn product_location(&self, platform: &str, is_root: bool) -> (PathBuf, String) {
        let platform = platform.to_lowercase();
        if is_root {
            (self.settings.cache_root.join(&platform), platform)
        } else {
            let game = self.settings.game.to_lowercase();
            (
                self.settings.cache_root.join(&platform).join(&game),
                format!("{}/{}", platform, game),
            )
        }
    }

    /// Whether the scan folder owning `source_id` is a root folder.
    pub(crate) fn source_is_root(&self, source_id: SourceId) -> bool {
        self.db
            .source(source_id)
            .and_then(|s| self.db.scan_folder(s.scan_folder_id))
            .and_then(|f| self.registry.scan_folders.by_portable_key(&f.portable_key))
            .is_some_and(|f| f.is_root)
    }

    /// Product path relative to its product root.
    pub(crate) fn product_relative_path(&self, platform: &str, is_root: bool, product_path: &str) -> String {
        let (_, prefix) = self.product_location(platform, is_root);
        strip_dir_prefix(product_path, &prefix)
            .unwrap_or(product_path)
            .to_string()
    }

    /// Remove a product file, then every directory it leaves empty up to the
    /// platform folder.
    pub(crate) fn delete_product_file(&self, platform: &str, product_path: &str) {
        let absolute = self.settings.cache_root.join(product_path);
        if self.fs.exists(&absolute) {
            if let Err(err) = self.fs.remove_file(&absolute) {
                warn!(product = %product_path, error = %format!("{err:#}"), "failed to delete product");
                return;
            }
        }

        let stop = self.settings.cache_root.join(platform.to_lowercase());
        let mut dir = absolute.parent();
        while let Some(current) = dir {
            if current == stop || !current.starts_with(&stop) {
                break;
            }
            let empty = self
                .fs
                .read_dir(current)
                .map(|entries| entries.is_empty())
                .unwrap_or(false);
            if !empty || self.fs.remove_dir(current).is_err() {
                break;
            }
            debug!(dir = ?current, "removed empty product directory");
            dir = current.parent();
        }
    }

    /// Sources whose scan folder is no longer configured.
    fn purge_orphaned_sources(&mut self) {
        let orphans: Vec<SourceId> = self
            .db
            .sources()
            .filter(|s| {
                self.db
                    .scan_folder(s.scan_folder_id)
                    .map(|f| self.registry.scan_folders.by_portable_key(&f.portable_key).is_none())
                    .unwrap_or(true)
            })
            .map(|s| s.id)
            .collect();

        for id in orphans {
            info!(source_id = id, "scan folder removed; dropping its source");
            self.delete_source(id);
        }
    }
}
