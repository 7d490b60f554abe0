// src/exec/job.rs

//! Job identity, job details and the per-job state machine.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::builder::{Builder, JobDescriptor, JobProduct};
use crate::errors::{PipelineError, Result};

/// Identifies one unit of work: (source, platform, job key, builder).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobEntry {
    /// Database name of the source.
    pub source: String,
    pub platform: String,
    pub job_key: String,
    pub builder_guid: Uuid,
}

impl fmt::Display for JobEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.source, self.platform, self.job_key)
    }
}

/// Everything a worker needs to run a job.
#[derive(Debug, Clone)]
pub struct JobDetails {
    pub entry: JobEntry,
    pub builder_name: String,
    /// Path relative to the watch folder.
    pub relative_path: String,
    pub watch_folder: PathBuf,
    pub full_path: PathBuf,
    pub source_uuid: Uuid,
    pub descriptor: JobDescriptor,

    pub fingerprint: u64,
    pub extra_info: String,
    pub fingerprint_files: Vec<PathBuf>,
    pub job_run_key: u64,

    pub critical: bool,
    pub check_exclusive_lock: bool,
    /// Fail without invoking the builder, replaying `fail_log`.
    pub auto_fail: bool,
    /// Complete without invoking the builder and without a database record.
    pub auto_succeed: bool,
    pub fail_log: Vec<String>,

    /// `<cache root>/<platform>/<game>`.
    pub product_root: PathBuf,
    /// `<platform>/<game>`, lowercase; prefix of product paths in the
    /// database.
    pub product_prefix: String,
    /// Directory of the source's database name, lowercase, relative to
    /// `product_root`.
    pub product_dir: String,
}

impl JobDetails {
    pub fn source(&self) -> &str {
        &self.entry.source
    }

    pub fn platform(&self) -> &str {
        &self.entry.platform
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Crashed,
    Terminated,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Pending | JobState::Processing)
    }
}

/// Execution wrapper around [`JobDetails`].
#[derive(Debug, Clone)]
pub struct RcJob {
    details: JobDetails,
    builder: Arc<dyn Builder>,
    state: JobState,
}

impl RcJob {
    pub fn new(details: JobDetails, builder: Arc<dyn Builder>) -> Self {
        Self {
            details,
            builder,
            state: JobState::Pending,
        }
    }

    pub fn details(&self) -> &JobDetails {
        &self.details
    }

    pub fn details_mut(&mut self) -> &mut JobDetails {
        &mut self.details
    }

    pub fn builder(&self) -> &Arc<dyn Builder> {
        &self.builder
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// `pending -> processing`.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            JobState::Pending => {
                self.state = JobState::Processing;
                Ok(())
            }
            other => Err(self.invalid(other, JobState::Processing)),
        }
    }

    /// `processing -> terminal`.
    pub fn finish(&mut self, state: JobState) -> Result<()> {
        if self.state != JobState::Processing || !state.is_terminal() {
            return Err(self.invalid(self.state, state));
        }
        self.state = state;
        Ok(())
    }

    /// `pending | processing -> cancelled`.
    pub fn cancel(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(self.invalid(self.state, JobState::Cancelled));
        }
        self.state = JobState::Cancelled;
        Ok(())
    }

    fn invalid(&self, from: JobState, to: JobState) -> PipelineError {
        PipelineError::JobStateError(format!(
            "{}: {:?} -> {:?}",
            self.details.entry, from, to
        ))
    }

    /// Final report sent back to the conductor.
    pub fn into_outcome(self, products: Vec<PlacedProduct>, messages: Vec<String>) -> JobOutcome {
        JobOutcome {
            fingerprint: self.details.fingerprint,
            details: self.details,
            state: self.state,
            products,
            messages,
        }
    }
}

/// A product moved into the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedProduct {
    pub product: JobProduct,
    /// Relative to the job's product root, lowercase.
    pub relative_path: String,
    /// Relative to the cache root (`<platform>/<game>/...`), lowercase.
    pub cache_path: String,
    pub absolute_path: PathBuf,
    pub hash: String,
}

/// Terminal report of one job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub details: JobDetails,
    pub state: JobState,
    /// Fingerprint of the content that was actually processed.
    pub fingerprint: u64,
    pub products: Vec<PlacedProduct>,
    pub messages: Vec<String>,
}

impl JobOutcome {
    /// Outcome for a job that completed with the given products.
    pub fn completed(details: JobDetails, products: Vec<PlacedProduct>) -> Self {
        Self {
            fingerprint: details.fingerprint,
            details,
            state: JobState::Completed,
            products,
            messages: Vec::new(),
        }
    }

    /// Outcome for a job that ended in `state` without products.
    pub fn without_products(details: JobDetails, state: JobState) -> Self {
        Self {
            fingerprint: details.fingerprint,
            details,
            state,
            products: Vec::new(),
            messages: Vec::new(),
        }
    }
}
