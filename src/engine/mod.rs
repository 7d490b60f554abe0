// src/engine/mod.rs

//! Orchestration engine for assetpipe.
//!
//! The conductor ([`core::Conductor`]) is a synchronous state machine that
//! owns the asset database, the registries and the in-flight job set. It
//! consumes [`RuntimeEvent`]s and returns [`CoreCommand`]s:
//! - [`assess`] turns raw file events into work (sidecars, overrides, folder
//!   events, deletions, cache product deletions),
//! - [`analyze`] asks builders for jobs, updates dependencies and decides via
//!   fingerprints what must run,
//! - [`results`] reconciles products when jobs finish,
//! - [`scan`] walks the scan folders at startup.
//!
//! The async/IO shell lives in [`runtime`].

use std::path::PathBuf;

use uuid::Uuid;

use crate::builder::AssetId;
use crate::exec::{JobDetails, JobOutcome};

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Exit once the conductor reports idle (used for `--once`).
    pub exit_when_idle: bool,
}

/// Events flowing into the runtime from the watcher and the executor.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    FileAdded(PathBuf),
    FileModified(PathBuf),
    FileDeleted(PathBuf),
    /// A job reached a terminal state.
    JobFinished(Box<JobOutcome>),
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetNotificationKind {
    Changed,
    Removed,
}

/// A product appeared, changed or went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetNotification {
    pub kind: AssetNotificationKind,
    /// Relative to `<cache root>/<platform>/<game>`.
    pub product_path: String,
    pub asset_id: AssetId,
    pub legacy_asset_ids: Vec<AssetId>,
    pub asset_type: Uuid,
}

/// Published to notification subscribers.
#[derive(Debug, Clone)]
pub enum Notification {
    /// A job was queued for execution.
    AssetToProcess(JobDetails),
    AssetMessage {
        platform: String,
        message: AssetNotification,
    },
    /// A job of `source` finished successfully for `platform`.
    InputAssetProcessed { source: String, platform: String },
    /// True when no event, queued file or job is left.
    IdleState(bool),
}

pub mod analyze;
pub mod assess;
pub mod core;
pub mod results;
pub mod runtime;
pub mod scan;

pub use core::{Conductor, ConductorSettings, CoreCommand, CoreStep, DEFAULT_BATCH_LIMIT};
pub use results::legacy_asset_ids;
pub use runtime::Runtime;
