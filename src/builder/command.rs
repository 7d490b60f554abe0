// src/builder/command.rs

//! Builder that runs an external shell command per job.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::builder::{
    Builder, BuilderDescriptor, BuilderPattern, CreateJobsRequest, CreateJobsResponse,
    JobDescriptor, JobProduct, ProcessJobFuture, ProcessJobRequest, ProcessJobResponse,
    ProcessJobResultCode,
};
use crate::config::{BuilderConfig, ConfigFile};

/// Runs `cmd` through the platform shell with the job described in
/// environment variables:
///
/// - `ASSETPIPE_SOURCE`: absolute source path
/// - `ASSETPIPE_SOURCE_RELATIVE`: path relative to the watch folder
/// - `ASSETPIPE_PLATFORM`, `ASSETPIPE_JOB_KEY`
/// - `ASSETPIPE_TEMP_DIR`: where the command must write its products
///
/// Every file left in the temp directory after a zero exit is a product.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    descriptor: BuilderDescriptor,
    cmd: String,
    job_key: String,
    auto_fail: bool,
    auto_succeed: bool,
}

impl CommandBuilder {
    pub fn new(name: &str, cfg: &BuilderConfig, patterns: Vec<BuilderPattern>) -> Self {
        let mut descriptor = BuilderDescriptor::named(name)
            .with_version(&cfg.version)
            .with_analysis_fingerprint(&cfg.fingerprint);
        descriptor.patterns = patterns;

        Self {
            descriptor,
            cmd: cfg.cmd.clone(),
            job_key: cfg.job_key.clone(),
            auto_fail: cfg.auto_fail,
            auto_succeed: cfg.auto_succeed,
        }
    }

    /// One builder per `[builder.<name>]` section; its patterns are those of
    /// the recognizers routed to it.
    pub fn all_from_config(cfg: &ConfigFile) -> Vec<Self> {
        cfg.builders
            .iter()
            .map(|(name, builder_cfg)| {
                let patterns = cfg
                    .recognizers
                    .values()
                    .filter(|r| &r.builder == name)
                    .map(|r| BuilderPattern {
                        pattern: r.pattern.clone(),
                        pattern_type: r.pattern_type,
                    })
                    .collect();
                Self::new(name, builder_cfg, patterns)
            })
            .collect()
    }
}

impl Builder for CommandBuilder {
    fn descriptor(&self) -> &BuilderDescriptor {
        &self.descriptor
    }

    fn create_jobs(&self, request: &CreateJobsRequest) -> CreateJobsResponse {
        let jobs = request
            .enabled_platforms
            .iter()
            .map(|platform| {
                let mut job = JobDescriptor::new(&self.job_key, platform);
                job.auto_fail = self.auto_fail;
                job.auto_succeed = self.auto_succeed;
                job
            })
            .collect();
        let mut response = CreateJobsResponse::success(jobs);
        if self.auto_fail {
            response
                .messages
                .push(format!("builder {} is configured to fail every job", self.descriptor.name));
        }
        response
    }

    fn process_job(&self, request: ProcessJobRequest, cancel: CancellationToken) -> ProcessJobFuture<'_> {
        Box::pin(async move {
            let builder = self.descriptor.name.clone();
            match run_command(&self.cmd, &request, &cancel).await {
                Ok(response) => response,
                Err(err) => {
                    error!(
                        builder = %builder,
                        source = %request.source_file,
                        error = %err,
                        "builder command failed to run"
                    );
                    ProcessJobResponse::with_code(ProcessJobResultCode::Failed)
                }
            }
        })
    }
}

async fn run_command(
    cmd_line: &str,
    request: &ProcessJobRequest,
    cancel: &CancellationToken,
) -> Result<ProcessJobResponse> {
    info!(
        source = %request.source_file,
        platform = %request.platform,
        job_key = %request.job.job_key,
        cmd = %cmd_line,
        "starting builder process"
    );

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd_line);
        c
    };

    cmd.env("ASSETPIPE_SOURCE", &request.full_path)
        .env("ASSETPIPE_SOURCE_RELATIVE", &request.source_file)
        .env("ASSETPIPE_PLATFORM", &request.platform)
        .env("ASSETPIPE_JOB_KEY", &request.job.job_key)
        .env("ASSETPIPE_TEMP_DIR", &request.temp_dir_path)
        .current_dir(&request.watch_folder)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning builder process for '{}'", request.source_file))?;

    // Always consume output so pipe buffers don't fill; log at debug.
    if let Some(stdout) = child.stdout.take() {
        spawn_line_logger(stdout, request.source_file.clone(), "stdout");
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_line_logger(stderr, request.source_file.clone(), "stderr");
    }

    tokio::select! {
        status_res = child.wait() => {
            let status = status_res.with_context(|| {
                format!("waiting for builder process of '{}'", request.source_file)
            })?;

            info!(
                source = %request.source_file,
                exit_code = ?status.code(),
                success = status.success(),
                "builder process exited"
            );

            if status.success() {
                let products = collect_products(&request.temp_dir_path).await?;
                Ok(ProcessJobResponse::success(products))
            } else if status.code().is_none() {
                // Terminated by a signal.
                Ok(ProcessJobResponse::with_code(ProcessJobResultCode::Crashed))
            } else {
                Ok(ProcessJobResponse::with_code(ProcessJobResultCode::Failed))
            }
        }

        _ = cancel.cancelled() => {
            info!(
                source = %request.source_file,
                "shutdown requested while builder was running; killing process"
            );
            if let Err(e) = child.kill().await {
                warn!(
                    source = %request.source_file,
                    error = %e,
                    "failed to kill builder process on cancellation"
                );
            }
            Ok(ProcessJobResponse::with_code(ProcessJobResultCode::Cancelled))
        }
    }
}

fn spawn_line_logger<R>(reader: R, source: String, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(source = %source, "{}: {}", stream, line);
        }
    });
}

/// Every file below `temp_dir`, relative to it, sorted; sub ids follow that
/// order.
async fn collect_products(temp_dir: &Path) -> Result<Vec<JobProduct>> {
    let mut files: Vec<PathBuf> = Vec::new();
    let mut stack = vec![temp_dir.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("reading dir {:?}", dir))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                stack.push(path);
            } else if let Ok(rel) = path.strip_prefix(temp_dir) {
                files.push(rel.to_path_buf());
            }
        }
    }

    files.sort();
    Ok(files
        .into_iter()
        .enumerate()
        .map(|(idx, rel)| JobProduct::new(rel, idx as u32))
        .collect())
}
