// src/engine/analyze.rs

//! Source analysis: ask every matching builder for jobs, record the declared
//! dependencies and dispatch the jobs whose fingerprint changed.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::builder::{
    Builder, BuilderDescriptor, CreateJobsRequest, CreateJobsResultCode, JobDescriptor,
    SourceFileDependency,
};
use crate::dag::{query_absolute_path_dependencies_recursive, DependencyTarget};
use crate::db::{source_uuid, JobId, JobKey, JobStatus, SourceId};
use crate::engine::core::Conductor;
use crate::exec::{JobDetails, JobEntry, RcJob};
use crate::fingerprint::{
    compute_aggregate_hash, compute_fingerprint, extra_info, FingerprintSpec, FAILED_FINGERPRINT,
};
use crate::path_utils::{name_key, normalize_path};
use crate::registry::{AssetRecognizer, RelativePath, ScanFolderInfo};
use crate::types::DependencyType;

/// Platform used by jobs that report a CreateJobs failure.
pub const ALL_PLATFORMS: &str = "all";

const CREATE_JOBS_KEY_PREFIX: &str = "CreateJobs_";

/// Jobs standing in for a failed CreateJobs call. Their results are logged,
/// never stored.
pub(crate) fn is_create_jobs_failure(details: &JobDetails) -> bool {
    details.auto_fail
        && details.entry.platform == ALL_PLATFORMS
        && details.entry.job_key.starts_with(CREATE_JOBS_KEY_PREFIX)
}

type BuilderGroup = (Arc<dyn Builder>, Vec<AssetRecognizer>);

/// The source being analyzed.
struct SourceContext<'a> {
    path: &'a Path,
    rel: &'a RelativePath,
    folder: &'a ScanFolderInfo,
    source_id: SourceId,
    source_uuid: Uuid,
}

impl Conductor {
    /// Analyze the file at `path`. With `from_scan`, analysis is skipped when
    /// neither the file, its fingerprint set nor its builders changed since
    /// the last successful analysis.
    pub(crate) fn analyze_source(&mut self, path: &Path, rel: &RelativePath, from_scan: bool) {
        let Some(folder) = self.registry.scan_folders.scan_folder_for_file(path).cloned() else {
            return;
        };
        let folder_id = self.db.upsert_scan_folder(&folder);
        let groups = self.builder_groups(&rel.relative_path, &folder);
        let existing = self.db.source_by_name(&rel.database_name).map(|s| s.id);

        if groups.is_empty() {
            // Not buildable, but may still be a dependency of something.
            let waiting = self.db.dependencies.resolve_placeholders(
                &rel.database_name,
                &rel.relative_path,
                source_uuid(&rel.database_name),
            );
            if existing.is_some() || !waiting.is_empty() {
                let (source_id, _) =
                    self.db
                        .get_or_create_source(folder_id, &rel.database_name, &rel.relative_path);
                self.remove_jobs_of_builders_except(source_id, &rel.database_name, &HashSet::new());
                self.dirty = true;
            }
            self.requeue_sources(waiting);
            if existing.is_some() && !from_scan {
                let dependents = self.db.dependencies.dependents_of(&rel.database_name);
                self.requeue_sources(dependents);
            }
            debug!(file = %rel.database_name, "no recognizer matches; nothing to build");
            return;
        }

        let (source_id, created) =
            self.db
                .get_or_create_source(folder_id, &rel.database_name, &rel.relative_path);
        let Some(uuid) = self.db.source(source_id).map(|s| s.uuid) else {
            return;
        };
        if created {
            debug!(source = %rel.database_name, uuid = %uuid, "registered source");
            self.dirty = true;
        }
        let waiting = self
            .db
            .dependencies
            .resolve_placeholders(&rel.database_name, &rel.relative_path, uuid);
        if !waiting.is_empty() {
            self.dirty = true;
            self.requeue_sources(waiting);
        }
        if !created && !from_scan {
            let dependents = self.db.dependencies.dependents_of(&rel.database_name);
            self.requeue_sources(dependents);
        }

        if from_scan && self.analysis_is_current(path, &rel.database_name, source_id, &groups) {
            debug!(source = %rel.database_name, "unchanged since last analysis; skipping");
            return;
        }

        let ctx = SourceContext {
            path,
            rel,
            folder: &folder,
            source_id,
            source_uuid: uuid,
        };

        let mut all_succeeded = true;
        let mut matched = HashSet::new();
        for (builder, recognizers) in groups.iter() {
            matched.insert(builder.descriptor().bus_id);
            if !self.create_jobs_for(&ctx, Arc::clone(builder), recognizers) {
                all_succeeded = false;
            }
        }
        self.remove_jobs_of_builders_except(source_id, &rel.database_name, &matched);

        let analysis = if all_succeeded {
            self.analysis_fingerprint(path, &rel.database_name, &groups)
        } else {
            String::new()
        };
        if let Some(source) = self.db.source_mut(source_id) {
            source.analysis_fingerprint = analysis;
        }
        self.dirty = true;
    }

    /// Matching recognizers that build for at least one platform of
    /// `folder`, grouped by builder in priority order.
    fn builder_groups(&self, relative_path: &str, folder: &ScanFolderInfo) -> Vec<BuilderGroup> {
        let mut groups: Vec<BuilderGroup> = Vec::new();
        for recognizer in self.registry.recognizers.matching_recognizers(relative_path) {
            if !folder.platforms.iter().any(|p| recognizer.builds_for(p)) {
                continue;
            }
            let Some(builder) = self.builders.get(&recognizer.builder) else {
                warn!(recognizer = %recognizer.name, builder = %recognizer.builder, "recognizer names an unregistered builder");
                continue;
            };
            let bus_id = builder.descriptor().bus_id;
            match groups.iter_mut().find(|(b, _)| b.descriptor().bus_id == bus_id) {
                Some((_, recognizers)) => recognizers.push(recognizer.clone()),
                None => groups.push((Arc::clone(builder), vec![recognizer.clone()])),
            }
        }
        groups
    }

    fn analysis_is_current(
        &mut self,
        path: &Path,
        database_name: &str,
        source_id: SourceId,
        groups: &[BuilderGroup],
    ) -> bool {
        if self.builders.builders_added_or_removed() {
            return false;
        }
        if groups
            .iter()
            .any(|(b, _)| self.builders.is_builder_dirty(&b.descriptor().bus_id))
        {
            return false;
        }
        let stored = match self.db.source(source_id) {
            Some(s) if !s.analysis_fingerprint.is_empty() => s.analysis_fingerprint.clone(),
            _ => return false,
        };
        if !self.jobs_up_to_date(source_id) {
            return false;
        }
        stored == self.analysis_fingerprint(path, database_name, groups)
    }

    /// Every job of the source completed and still has all of its products.
    fn jobs_up_to_date(&self, source_id: SourceId) -> bool {
        self.db.jobs_for_source(source_id).into_iter().all(|job| {
            job.status == JobStatus::Completed
                && job.fingerprint != FAILED_FINGERPRINT
                && !self.products_missing(job.id)
        })
    }

    pub(crate) fn products_missing(&self, job_id: JobId) -> bool {
        self.db
            .products_for_job(job_id)
            .into_iter()
            .any(|p| !self.fs.is_file(&self.settings.cache_root.join(&p.product_path)))
    }

    /// Hash over the builders and recognizers involved, the source content and
    /// the content of its fingerprint set.
    fn analysis_fingerprint(&mut self, path: &Path, database_name: &str, groups: &[BuilderGroup]) -> String {
        let mut stamps = Vec::new();
        for (builder, recognizers) in groups {
            let d = builder.descriptor();
            stamps.push(format!("{}|{}|{}", d.bus_id, d.version, d.analysis_fingerprint));
            for r in recognizers {
                stamps.push(format!("{}|{}|{:?}", r.name, r.version, r.platform_params));
            }
        }

        let fs = Arc::clone(&self.fs);
        stamps.push(self.file_cache.stamp(fs.as_ref(), path).unwrap_or_default());
        for file in self.fingerprint_files(path, database_name) {
            stamps.push(normalize_path(&file).to_lowercase());
            stamps.push(self.file_cache.stamp(fs.as_ref(), &file).unwrap_or_default());
        }
        compute_aggregate_hash(&stamps)
    }

    /// Sidecars of the source plus the absolute paths of its dependency
    /// closure (both edge kinds), excluding the source itself.
    pub(crate) fn fingerprint_files(&self, path: &Path, database_name: &str) -> Vec<PathBuf> {
        let mut files = self.registry.recognizers.sidecars_for(path);
        let closure = query_absolute_path_dependencies_recursive(
            &self.db.dependencies,
            database_name,
            DependencyType::Any,
            false,
            |name| {
                self.db
                    .source_by_name(name)
                    .and_then(|s| self.db.absolute_path_of(s))
            },
        );
        let own = name_key(database_name);
        files.extend(
            closure
                .into_iter()
                .filter(|(_, name)| name_key(name) != own)
                .map(|(path, _)| path),
        );
        files
    }

    /// Run CreateJobs for one builder and dispatch what changed. False when
    /// the builder failed or is shutting down.
    fn create_jobs_for(
        &mut self,
        ctx: &SourceContext<'_>,
        builder: Arc<dyn Builder>,
        recognizers: &[AssetRecognizer],
    ) -> bool {
        let descriptor = builder.descriptor().clone();
        let platforms: Vec<String> = ctx
            .folder
            .platforms
            .iter()
            .filter(|p| recognizers.iter().any(|r| r.builds_for(p)))
            .cloned()
            .collect();

        let request = CreateJobsRequest {
            builder_id: descriptor.bus_id,
            source_file: ctx.rel.relative_path.clone(),
            watch_folder: ctx.rel.scan_folder.clone(),
            enabled_platforms: platforms.clone(),
            source_uuid: ctx.source_uuid,
        };
        debug!(source = %ctx.rel.database_name, builder = %descriptor.name, "create jobs");
        let response = builder.create_jobs(&request);

        match response.result {
            CreateJobsResultCode::Success => {}
            CreateJobsResultCode::ShuttingDown => {
                info!(source = %ctx.rel.database_name, builder = %descriptor.name, "builder is shutting down");
                return false;
            }
            CreateJobsResultCode::Failed => {
                warn!(source = %ctx.rel.database_name, builder = %descriptor.name, "create jobs failed");
                self.dispatch_create_jobs_failure(ctx, builder, response.messages);
                return false;
            }
        }

        let jobs = validate_jobs(&descriptor, &ctx.rel.database_name, &platforms, response.jobs);

        let mut declared = Vec::new();
        for dep in response.source_file_dependencies.iter() {
            let kind = match dep.dependency_type {
                DependencyType::JobToJob => DependencyType::JobToJob,
                _ => DependencyType::SourceToSource,
            };
            match self.resolve_dependency(dep, &ctx.rel.scan_folder) {
                Some(target) => declared.push((target, kind)),
                None => warn!(source = %ctx.rel.database_name, "dependency names neither a path nor a uuid; ignoring"),
            }
        }
        for job in jobs.iter() {
            for dep in job.job_dependencies.iter() {
                if let Some(target) = self.resolve_dependency(&dep.source, &ctx.rel.scan_folder) {
                    declared.push((target, DependencyType::JobToJob));
                }
            }
        }
        self.db.dependencies.update_source_file_dependency_database(
            &ctx.rel.database_name,
            descriptor.bus_id,
            declared,
        );
        self.dirty = true;

        let fingerprint_files = self.fingerprint_files(ctx.path, &ctx.rel.database_name);
        let recognizer_refs: Vec<&AssetRecognizer> = recognizers.iter().collect();
        let mut emitted: HashSet<(String, String)> = HashSet::new();

        for job in jobs {
            emitted.insert((job.platform.clone(), job.job_key.clone()));

            let info = extra_info(
                &descriptor,
                &recognizer_refs,
                &job.platform,
                &job.job_key,
                &job.additional_fingerprint_info,
            );
            let spec = FingerprintSpec {
                source: ctx.path,
                extra_info: &info,
                fingerprint_files: &fingerprint_files,
            };
            let fs = Arc::clone(&self.fs);
            let fingerprint = compute_fingerprint(&spec, |p| self.file_cache.stamp(fs.as_ref(), p));

            let key = JobKey {
                source_id: ctx.source_id,
                platform: job.platform.clone(),
                job_key: job.job_key.clone(),
                builder_guid: descriptor.bus_id,
            };
            if !self.job_needs_processing(&key, fingerprint) {
                debug!(
                    source = %ctx.rel.database_name,
                    platform = %job.platform,
                    job_key = %job.job_key,
                    "fingerprint unchanged; skipping"
                );
                continue;
            }

            let mut details = self.job_details(
                ctx,
                &descriptor,
                recognizers,
                job,
                fingerprint,
                info,
                fingerprint_files.clone(),
            );
            if details.auto_fail {
                details.fail_log = response.messages.clone();
            }
            self.dispatch_job(RcJob::new(details, Arc::clone(&builder)));
        }

        let stale: Vec<JobId> = self
            .db
            .jobs_for_source(ctx.source_id)
            .into_iter()
            .filter(|j| j.builder_guid == descriptor.bus_id)
            .filter(|j| !emitted.contains(&(j.platform.clone(), j.job_key.clone())))
            .map(|j| j.id)
            .collect();
        for job_id in stale {
            info!(source = %ctx.rel.database_name, builder = %descriptor.name, "job no longer emitted; removing");
            self.remove_job_with_products(job_id);
        }

        true
    }

    fn job_needs_processing(&self, key: &JobKey, fingerprint: u64) -> bool {
        match self.db.find_job(key) {
            None => true,
            Some(row) => {
                row.status != JobStatus::Completed
                    || row.fingerprint != fingerprint
                    || self.products_missing(row.id)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn job_details(
        &self,
        ctx: &SourceContext<'_>,
        descriptor: &BuilderDescriptor,
        recognizers: &[AssetRecognizer],
        job: JobDescriptor,
        fingerprint: u64,
        extra_info: String,
        fingerprint_files: Vec<PathBuf>,
    ) -> JobDetails {
        let (product_root, product_prefix) = self.product_location(&job.platform, ctx.folder.is_root);
        let product_dir = Path::new(&ctx.rel.database_name)
            .parent()
            .map(|p| normalize_path(p).to_lowercase())
            .unwrap_or_default();

        JobDetails {
            entry: JobEntry {
                source: ctx.rel.database_name.clone(),
                platform: job.platform.clone(),
                job_key: job.job_key.clone(),
                builder_guid: descriptor.bus_id,
            },
            builder_name: descriptor.name.clone(),
            relative_path: ctx.rel.relative_path.clone(),
            watch_folder: ctx.rel.scan_folder.clone(),
            full_path: ctx.path.to_path_buf(),
            source_uuid: ctx.source_uuid,
            critical: job.critical || recognizers.iter().any(|r| r.critical),
            check_exclusive_lock: job.check_exclusive_lock
                || recognizers.iter().any(|r| r.exclusive_lock),
            auto_fail: job.auto_fail,
            auto_succeed: job.auto_succeed,
            descriptor: job,
            fingerprint,
            extra_info,
            fingerprint_files,
            job_run_key: 0,
            fail_log: Vec::new(),
            product_root,
            product_prefix,
            product_dir,
        }
    }

    /// Queue a job that fails without running, carrying the builder's
    /// CreateJobs messages.
    fn dispatch_create_jobs_failure(
        &mut self,
        ctx: &SourceContext<'_>,
        builder: Arc<dyn Builder>,
        messages: Vec<String>,
    ) {
        let descriptor = builder.descriptor().clone();
        let job_key = format!("{}{}", CREATE_JOBS_KEY_PREFIX, descriptor.bus_id);
        let mut job = JobDescriptor::new(&job_key, ALL_PLATFORMS);
        job.critical = true;

        let mut details = self.job_details(
            ctx,
            &descriptor,
            &[],
            job,
            FAILED_FINGERPRINT,
            String::new(),
            Vec::new(),
        );
        details.auto_fail = true;
        details.fail_log = messages;
        self.dispatch_job(RcJob::new(details, builder));
    }

    /// Remove the jobs (and edges) of every builder not in `keep`.
    fn remove_jobs_of_builders_except(&mut self, source_id: SourceId, database_name: &str, keep: &HashSet<Uuid>) {
        let stale: Vec<JobId> = self
            .db
            .jobs_for_source(source_id)
            .into_iter()
            .filter(|j| !keep.contains(&j.builder_guid))
            .map(|j| j.id)
            .collect();
        for job_id in stale {
            info!(source = %database_name, "builder no longer matches; removing job");
            self.remove_job_with_products(job_id);
        }

        let builders: BTreeSet<Uuid> = self
            .db
            .dependencies
            .dependencies_of(database_name)
            .into_iter()
            .map(|e| e.builder_guid)
            .filter(|g| !keep.contains(g))
            .collect();
        for guid in builders {
            self.db.dependencies.remove_edges_of_builder(database_name, guid);
            self.dirty = true;
        }
    }

    /// Turn a declared dependency into an edge target. Known sources resolve
    /// immediately, existing files are registered on the spot, anything else
    /// becomes a placeholder.
    fn resolve_dependency(&mut self, dep: &SourceFileDependency, watch_folder: &Path) -> Option<DependencyTarget> {
        if let Some(raw) = dep.path.as_deref().filter(|p| !p.trim().is_empty()) {
            return Some(self.resolve_dependency_path(raw, watch_folder));
        }
        let uuid = dep.uuid?;
        Some(match self.db.source_by_uuid(&uuid) {
            Some(source) => DependencyTarget::Resolved(source.database_name.clone()),
            None => DependencyTarget::PendingUuid(uuid),
        })
    }

    fn resolve_dependency_path(&mut self, raw: &str, watch_folder: &Path) -> DependencyTarget {
        let declared = raw.replace('\\', "/");
        let as_path = Path::new(&declared);

        if as_path.is_absolute() {
            return match self.registry.scan_folders.convert_to_relative_path(as_path) {
                Some(rel) => self
                    .register_dependency(as_path, &rel)
                    .unwrap_or(DependencyTarget::PendingPath(rel.database_name)),
                None => DependencyTarget::PendingPath(declared),
            };
        }

        if let Some(source) = self.db.source_by_name(&declared) {
            return DependencyTarget::Resolved(source.database_name.clone());
        }

        let candidate = watch_folder.join(&declared);
        if let Some(rel) = self.registry.scan_folders.convert_to_relative_path(&candidate) {
            if let Some(target) = self.register_dependency(&candidate, &rel) {
                return target;
            }
        }

        let found = self
            .registry
            .scan_folders
            .find_first_matching_file(self.fs.as_ref(), &declared);
        if let Some(found) = found {
            if let Some(rel) = self.registry.scan_folders.convert_to_relative_path(&found) {
                if let Some(target) = self.register_dependency(&found, &rel) {
                    return target;
                }
            }
        }

        DependencyTarget::PendingPath(declared)
    }

    /// Resolve `rel` to a source, registering the file if it exists but is
    /// not known yet.
    fn register_dependency(&mut self, path: &Path, rel: &RelativePath) -> Option<DependencyTarget> {
        if let Some(source) = self.db.source_by_name(&rel.database_name) {
            return Some(DependencyTarget::Resolved(source.database_name.clone()));
        }
        if !self.fs.is_file(path) {
            return None;
        }

        // The highest-priority copy owns the name.
        let winner = self
            .registry
            .scan_folders
            .find_first_matching_file(self.fs.as_ref(), &rel.database_name)
            .unwrap_or_else(|| path.to_path_buf());
        let winner_rel = self.registry.scan_folders.convert_to_relative_path(&winner)?;
        let folder = self.registry.scan_folders.scan_folder_for_file(&winner)?.clone();
        let folder_id = self.db.upsert_scan_folder(&folder);

        let (source_id, created) = self.db.get_or_create_source(
            folder_id,
            &winner_rel.database_name,
            &winner_rel.relative_path,
        );
        if created {
            debug!(source = %winner_rel.database_name, "registered dependency source");
            self.dirty = true;
            if let Some(uuid) = self.db.source(source_id).map(|s| s.uuid) {
                let waiting = self.db.dependencies.resolve_placeholders(
                    &winner_rel.database_name,
                    &winner_rel.relative_path,
                    uuid,
                );
                self.requeue_sources(waiting);
            }
        }
        Some(DependencyTarget::Resolved(winner_rel.database_name))
    }
}

/// Drop malformed job descriptors: empty key, a platform that was not
/// requested, or a duplicate (platform, key).
fn validate_jobs(
    descriptor: &BuilderDescriptor,
    source: &str,
    platforms: &[String],
    jobs: Vec<JobDescriptor>,
) -> Vec<JobDescriptor> {
    let mut seen = HashSet::new();
    jobs.into_iter()
        .filter(|job| {
            if job.job_key.trim().is_empty() {
                error!(builder = %descriptor.name, source = %source, "job descriptor without a job key; dropping");
                return false;
            }
            if !platforms.iter().any(|p| p == &job.platform) {
                error!(
                    builder = %descriptor.name,
                    source = %source,
                    platform = %job.platform,
                    "job descriptor for a platform that was not requested; dropping"
                );
                return false;
            }
            if !seen.insert((job.platform.clone(), job.job_key.clone())) {
                warn!(
                    builder = %descriptor.name,
                    source = %source,
                    platform = %job.platform,
                    job_key = %job.job_key,
                    "duplicate job descriptor; dropping"
                );
                return false;
            }
            true
        })
        .collect()
}
