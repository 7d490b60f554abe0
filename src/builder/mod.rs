// src/builder/mod.rs

//! Builder contract.
//!
//! A builder turns one source file into zero or more platform-specific
//! products in two phases:
//! - `create_jobs` runs on the conductor and only describes work (one job per
//!   platform / job key) plus the source files the result depends on;
//! - `process_job` runs on a job worker and produces product files in a
//!   temporary directory.
//!
//! [`command::CommandBuilder`] is the production implementation driven by
//! `[builder.<name>]` config sections. Tests provide scripted builders.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::types::{DependencyType, PatternType};

pub mod command;

pub use command::CommandBuilder;

/// Future returned by [`Builder::process_job`].
pub type ProcessJobFuture<'a> = Pin<Box<dyn Future<Output = ProcessJobResponse> + Send + 'a>>;

/// Capability interface implemented by every builder.
pub trait Builder: Send + Sync + fmt::Debug {
    /// Static identity used for registration and dirtiness tracking.
    fn descriptor(&self) -> &BuilderDescriptor;

    fn create_jobs(&self, request: &CreateJobsRequest) -> CreateJobsResponse;

    /// Run one job. `cancel` fires when the pipeline is shutting down;
    /// builders may ignore it.
    fn process_job(&self, request: ProcessJobRequest, cancel: CancellationToken) -> ProcessJobFuture<'_>;
}

/// A pattern a builder declares interest in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuilderPattern {
    pub pattern: String,
    pub pattern_type: PatternType,
}

impl BuilderPattern {
    pub fn wildcard(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            pattern_type: PatternType::Wildcard,
        }
    }
}

/// Identity of a registered builder, persisted between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderDescriptor {
    pub name: String,
    pub bus_id: Uuid,
    pub version: String,
    /// Changing this forces reanalysis of every file the builder matches.
    pub analysis_fingerprint: String,
    pub patterns: Vec<BuilderPattern>,
}

impl BuilderDescriptor {
    /// Descriptor whose bus id is derived from the builder name.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bus_id: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()),
            version: String::new(),
            analysis_fingerprint: String::new(),
            patterns: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn with_analysis_fingerprint(mut self, fingerprint: &str) -> Self {
        self.analysis_fingerprint = fingerprint.to_string();
        self
    }

    pub fn with_pattern(mut self, pattern: BuilderPattern) -> Self {
        self.patterns.push(pattern);
        self
    }
}

/// A dependency declared by `create_jobs`: by path (relative to the watch
/// folder, a bare file name, an output-prefixed database name or absolute),
/// or by source UUID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileDependency {
    pub path: Option<String>,
    pub uuid: Option<Uuid>,
    pub dependency_type: DependencyType,
}

impl SourceFileDependency {
    pub fn by_path(path: &str) -> Self {
        Self {
            path: Some(path.to_string()),
            uuid: None,
            dependency_type: DependencyType::SourceToSource,
        }
    }

    pub fn by_uuid(uuid: Uuid) -> Self {
        Self {
            path: None,
            uuid: Some(uuid),
            dependency_type: DependencyType::SourceToSource,
        }
    }
}

/// A job that must be analyzed before the declaring job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDependency {
    pub source: SourceFileDependency,
    pub job_key: String,
    pub platform: String,
}

/// One job a builder wants to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_key: String,
    pub platform: String,
    pub critical: bool,
    pub priority: i32,
    /// Extra text folded into the job fingerprint.
    pub additional_fingerprint_info: String,
    pub check_exclusive_lock: bool,
    /// Fail without processing; the CreateJobs messages become the fail log.
    pub auto_fail: bool,
    /// Nothing to build: complete without processing and without a record.
    pub auto_succeed: bool,
    pub job_dependencies: Vec<JobDependency>,
}

impl JobDescriptor {
    pub fn new(job_key: &str, platform: &str) -> Self {
        Self {
            job_key: job_key.to_string(),
            platform: platform.to_string(),
            critical: false,
            priority: 0,
            additional_fingerprint_info: String::new(),
            check_exclusive_lock: false,
            auto_fail: false,
            auto_succeed: false,
            job_dependencies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateJobsRequest {
    pub builder_id: Uuid,
    /// Path relative to the watch folder.
    pub source_file: String,
    pub watch_folder: PathBuf,
    pub enabled_platforms: Vec<String>,
    pub source_uuid: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateJobsResultCode {
    Success,
    Failed,
    ShuttingDown,
}

#[derive(Debug, Clone)]
pub struct CreateJobsResponse {
    pub result: CreateJobsResultCode,
    pub jobs: Vec<JobDescriptor>,
    pub source_file_dependencies: Vec<SourceFileDependency>,
    /// Diagnostic lines, replayed when the response is a failure.
    pub messages: Vec<String>,
}

impl CreateJobsResponse {
    pub fn success(jobs: Vec<JobDescriptor>) -> Self {
        Self {
            result: CreateJobsResultCode::Success,
            jobs,
            source_file_dependencies: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            result: CreateJobsResultCode::Failed,
            jobs: Vec::new(),
            source_file_dependencies: Vec::new(),
            messages: vec![message.into()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessJobRequest {
    /// Path relative to the watch folder.
    pub source_file: String,
    pub full_path: PathBuf,
    pub watch_folder: PathBuf,
    pub platform: String,
    pub job: JobDescriptor,
    /// Scratch directory; relative product paths are resolved against it.
    pub temp_dir_path: PathBuf,
    pub source_uuid: Uuid,
    pub job_run_key: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessJobResultCode {
    Success,
    Failed,
    Crashed,
    Cancelled,
}

/// Identity of a product: the owning source's UUID plus a sub id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId {
    pub guid: Uuid,
    pub sub_id: u32,
}

impl AssetId {
    pub fn new(guid: Uuid, sub_id: u32) -> Self {
        Self { guid, sub_id }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}:{:x}", self.guid.hyphenated(), self.sub_id)
    }
}

/// Dependency of one product on another product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductDependency {
    pub asset_id: AssetId,
    pub flags: u64,
}

/// One output file of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProduct {
    /// Absolute, or relative to the job's temp directory.
    pub product_file_name: PathBuf,
    pub sub_id: u32,
    pub asset_type: Uuid,
    /// Sub ids this product was known by in older pipelines.
    pub legacy_sub_ids: Vec<u32>,
    pub dependencies: Vec<ProductDependency>,
}

impl JobProduct {
    pub fn new(product_file_name: impl Into<PathBuf>, sub_id: u32) -> Self {
        Self {
            product_file_name: product_file_name.into(),
            sub_id,
            asset_type: Uuid::nil(),
            legacy_sub_ids: Vec::new(),
            dependencies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessJobResponse {
    pub result_code: ProcessJobResultCode,
    pub output_products: Vec<JobProduct>,
}

impl ProcessJobResponse {
    pub fn success(output_products: Vec<JobProduct>) -> Self {
        Self {
            result_code: ProcessJobResultCode::Success,
            output_products,
        }
    }

    pub fn with_code(result_code: ProcessJobResultCode) -> Self {
        Self {
            result_code,
            output_products: Vec::new(),
        }
    }
}
