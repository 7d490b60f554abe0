#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use assetpipe::builder::{
    Builder, BuilderDescriptor, BuilderPattern, CreateJobsRequest, CreateJobsResponse,
    JobDescriptor, JobProduct, ProcessJobFuture, ProcessJobRequest, ProcessJobResponse,
    ProcessJobResultCode, SourceFileDependency,
};
use assetpipe::fs::FileSystem;

/// One product a scripted job writes into its temp directory.
#[derive(Debug, Clone)]
pub struct ScriptedProduct {
    /// Relative to the job temp directory.
    pub name: String,
    pub sub_id: u32,
}

impl ScriptedProduct {
    pub fn new(name: &str, sub_id: u32) -> Self {
        Self {
            name: name.to_string(),
            sub_id,
        }
    }
}

/// A builder whose answers are configured by the test.
///
/// By default it creates one `Compile` job per requested platform, and each
/// job writes a single `<file name>.out` product (sub id 0) whose content is
/// the source content followed by the platform, so products change when
/// their source does.
#[derive(Debug)]
pub struct ScriptedBuilder {
    descriptor: BuilderDescriptor,
    fs: Arc<dyn FileSystem>,
    job_key: String,
    products: Mutex<HashMap<String, Vec<ScriptedProduct>>>,
    dependencies: Mutex<HashMap<String, Vec<SourceFileDependency>>>,
    failing_analysis: Mutex<HashSet<String>>,
    failing_jobs: Mutex<HashSet<String>>,
    auto_succeeding: Mutex<HashSet<String>>,
    auto_failing: Mutex<HashMap<String, Vec<String>>>,
    create_jobs_calls: AtomicUsize,
    process_calls: AtomicUsize,
}

impl ScriptedBuilder {
    pub fn new(name: &str, pattern: &str, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            descriptor: BuilderDescriptor::named(name)
                .with_version("1")
                .with_pattern(BuilderPattern::wildcard(pattern)),
            fs,
            job_key: "Compile".to_string(),
            products: Mutex::new(HashMap::new()),
            dependencies: Mutex::new(HashMap::new()),
            failing_analysis: Mutex::new(HashSet::new()),
            failing_jobs: Mutex::new(HashSet::new()),
            auto_succeeding: Mutex::new(HashSet::new()),
            auto_failing: Mutex::new(HashMap::new()),
            create_jobs_calls: AtomicUsize::new(0),
            process_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.descriptor.version = version.to_string();
        self
    }

    pub fn with_analysis_fingerprint(mut self, fingerprint: &str) -> Self {
        self.descriptor.analysis_fingerprint = fingerprint.to_string();
        self
    }

    /// Products written for `source` (relative to its scan folder).
    pub fn set_products(&self, source: &str, products: Vec<ScriptedProduct>) {
        self.products
            .lock()
            .unwrap()
            .insert(key(source), products);
    }

    /// Source dependencies reported by `create_jobs` for `source`.
    pub fn set_dependencies(&self, source: &str, deps: Vec<SourceFileDependency>) {
        self.dependencies
            .lock()
            .unwrap()
            .insert(key(source), deps);
    }

    /// Make `create_jobs` fail for `source`.
    pub fn fail_analysis(&self, source: &str, fail: bool) {
        let mut set = self.failing_analysis.lock().unwrap();
        if fail {
            set.insert(key(source));
        } else {
            set.remove(&key(source));
        }
    }

    /// Make `process_job` fail for `source`.
    pub fn fail_jobs(&self, source: &str, fail: bool) {
        let mut set = self.failing_jobs.lock().unwrap();
        if fail {
            set.insert(key(source));
        } else {
            set.remove(&key(source));
        }
    }

    /// Emit the jobs of `source` with `auto_succeed` set.
    pub fn auto_succeed_jobs(&self, source: &str) {
        self.auto_succeeding.lock().unwrap().insert(key(source));
    }

    /// Emit the jobs of `source` with `auto_fail` set, reporting `messages`
    /// from `create_jobs`.
    pub fn auto_fail_jobs(&self, source: &str, messages: Vec<String>) {
        self.auto_failing.lock().unwrap().insert(key(source), messages);
    }

    pub fn create_jobs_calls(&self) -> usize {
        self.create_jobs_calls.load(Ordering::SeqCst)
    }

    pub fn process_calls(&self) -> usize {
        self.process_calls.load(Ordering::SeqCst)
    }

    fn products_for(&self, source: &str) -> Vec<ScriptedProduct> {
        if let Some(products) = self.products.lock().unwrap().get(&key(source)) {
            return products.clone();
        }
        let file_name = Path::new(source)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        vec![ScriptedProduct::new(&format!("{file_name}.out"), 0)]
    }
}

fn key(source: &str) -> String {
    source.replace('\\', "/").to_lowercase()
}

impl Builder for ScriptedBuilder {
    fn descriptor(&self) -> &BuilderDescriptor {
        &self.descriptor
    }

    fn create_jobs(&self, request: &CreateJobsRequest) -> CreateJobsResponse {
        self.create_jobs_calls.fetch_add(1, Ordering::SeqCst);

        if self
            .failing_analysis
            .lock()
            .unwrap()
            .contains(&key(&request.source_file))
        {
            return CreateJobsResponse::failed(format!("cannot analyze {}", request.source_file));
        }

        let source = key(&request.source_file);
        let auto_succeed = self.auto_succeeding.lock().unwrap().contains(&source);
        let fail_messages = self.auto_failing.lock().unwrap().get(&source).cloned();

        let jobs = request
            .enabled_platforms
            .iter()
            .map(|platform| {
                let mut job = JobDescriptor::new(&self.job_key, platform);
                job.auto_succeed = auto_succeed;
                job.auto_fail = fail_messages.is_some();
                job
            })
            .collect();
        let mut response = CreateJobsResponse::success(jobs);
        response.messages = fail_messages.unwrap_or_default();
        if let Some(deps) = self.dependencies.lock().unwrap().get(&key(&request.source_file)) {
            response.source_file_dependencies = deps.clone();
        }
        response
    }

    fn process_job(&self, request: ProcessJobRequest, _cancel: CancellationToken) -> ProcessJobFuture<'_> {
        Box::pin(async move {
            self.process_calls.fetch_add(1, Ordering::SeqCst);

            if self
                .failing_jobs
                .lock()
                .unwrap()
                .contains(&key(&request.source_file))
            {
                return ProcessJobResponse::with_code(ProcessJobResultCode::Failed);
            }

            let mut content = match self.fs.read_to_string(&request.full_path) {
                Ok(content) => content.into_bytes(),
                Err(_) => return ProcessJobResponse::with_code(ProcessJobResultCode::Failed),
            };
            content.extend_from_slice(request.platform.as_bytes());

            let mut output = Vec::new();
            for product in self.products_for(&request.source_file) {
                let path = request.temp_dir_path.join(&product.name);
                if self.fs.write(&path, &content).is_err() {
                    return ProcessJobResponse::with_code(ProcessJobResultCode::Failed);
                }
                output.push(JobProduct::new(product.name.clone(), product.sub_id));
            }
            ProcessJobResponse::success(output)
        })
    }
}
