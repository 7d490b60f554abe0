// src/db/mod.rs

//! In-memory asset database: scan folders, sources, jobs, products and
//! their dependency rows, plus the builder set of the last session.
//!
//! Rows live in id-keyed arenas. Name, UUID and parent lookups go through
//! secondary indexes that are not serialized and are rebuilt by
//! [`AssetDatabase::rebuild_indexes`] after loading.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::builder::{BuilderDescriptor, ProductDependency};
use crate::dag::DependencyStore;
use crate::path_utils::{eq_ignore_case, name_key, strip_dir_prefix};
use crate::registry::ScanFolderInfo;

pub mod store;

pub use store::{FileStateStore, MemoryStateStore, StateStore};

pub type ScanFolderId = u64;
pub type SourceId = u64;
pub type JobId = u64;
pub type ProductId = u64;

/// Deterministic UUID of a source, derived from its database name.
///
/// Names are compared case-insensitively everywhere, so the UUID is derived
/// from the lowercased name.
pub fn source_uuid(database_name: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name_key(database_name).as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFolderRow {
    pub id: ScanFolderId,
    pub portable_key: String,
    pub path: PathBuf,
    pub display_name: String,
    pub output_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRow {
    pub id: SourceId,
    pub scan_folder_id: ScanFolderId,
    /// Output-prefix-qualified name, case preserved.
    pub database_name: String,
    /// Path relative to the owning scan folder.
    pub relative_path: String,
    pub uuid: Uuid,
    /// Fingerprint of the last successful analysis; empty if none.
    #[serde(default)]
    pub analysis_fingerprint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRow {
    pub id: JobId,
    pub source_id: SourceId,
    pub platform: String,
    pub job_key: String,
    pub builder_guid: Uuid,
    pub fingerprint: u64,
    pub job_run_key: u64,
    pub status: JobStatus,
    /// Diagnostic lines of the last failure.
    #[serde(default)]
    pub fail_log: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRow {
    pub id: ProductId,
    pub job_id: JobId,
    /// Path relative to the cache root (`<platform>/<game>/...`), lowercase.
    pub product_path: String,
    pub sub_id: u32,
    pub asset_type: Uuid,
    pub legacy_guid: Uuid,
    /// Content hash of the placed file.
    pub hash: String,
    #[serde(default)]
    pub legacy_sub_ids: Vec<u32>,
}

/// Fields needed to create or update a job row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobKey {
    pub source_id: SourceId,
    pub platform: String,
    pub job_key: String,
    pub builder_guid: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetDatabase {
    next_id: u64,
    scan_folders: BTreeMap<ScanFolderId, ScanFolderRow>,
    sources: BTreeMap<SourceId, SourceRow>,
    jobs: BTreeMap<JobId, JobRow>,
    products: BTreeMap<ProductId, ProductRow>,
    /// Keyed per product; never merged across products of one source.
    product_dependencies: BTreeMap<ProductId, Vec<ProductDependency>>,
    builder_info: Vec<BuilderDescriptor>,
    pub dependencies: DependencyStore,

    #[serde(skip)]
    source_by_name: HashMap<String, SourceId>,
    #[serde(skip)]
    source_by_uuid: HashMap<Uuid, SourceId>,
    #[serde(skip)]
    jobs_by_source: HashMap<SourceId, BTreeSet<JobId>>,
    #[serde(skip)]
    products_by_job: HashMap<JobId, BTreeSet<ProductId>>,
    #[serde(skip)]
    product_by_path: HashMap<String, ProductId>,
}

impl AssetDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild_indexes(&mut self) {
        self.source_by_name.clear();
        self.source_by_uuid.clear();
        self.jobs_by_source.clear();
        self.products_by_job.clear();
        self.product_by_path.clear();

        for source in self.sources.values() {
            self.source_by_name
                .insert(name_key(&source.database_name), source.id);
            self.source_by_uuid.insert(source.uuid, source.id);
        }
        for job in self.jobs.values() {
            self.jobs_by_source
                .entry(job.source_id)
                .or_default()
                .insert(job.id);
        }
        for product in self.products.values() {
            self.products_by_job
                .entry(product.job_id)
                .or_default()
                .insert(product.id);
            self.product_by_path
                .insert(name_key(&product.product_path), product.id);
        }

        let max_id = [
            self.scan_folders.keys().next_back(),
            self.sources.keys().next_back(),
            self.jobs.keys().next_back(),
            self.products.keys().next_back(),
        ]
        .into_iter()
        .flatten()
        .copied()
        .max()
        .unwrap_or(0);
        self.next_id = self.next_id.max(max_id);

        self.dependencies.rebuild_indexes();
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // ---- scan folders ----

    /// Insert or update the row for `folder`, keyed by portable key. A folder
    /// re-pointed to a new path keeps its id.
    pub fn upsert_scan_folder(&mut self, folder: &ScanFolderInfo) -> ScanFolderId {
        if let Some(row) = self
            .scan_folders
            .values_mut()
            .find(|r| eq_ignore_case(&r.portable_key, &folder.portable_key))
        {
            row.path = folder.path.clone();
            row.display_name = folder.display_name.clone();
            row.output_prefix = folder.output_prefix.clone();
            return row.id;
        }

        let id = self.allocate_id();
        self.scan_folders.insert(
            id,
            ScanFolderRow {
                id,
                portable_key: folder.portable_key.clone(),
                path: folder.path.clone(),
                display_name: folder.display_name.clone(),
                output_prefix: folder.output_prefix.clone(),
            },
        );
        id
    }

    pub fn scan_folder(&self, id: ScanFolderId) -> Option<&ScanFolderRow> {
        self.scan_folders.get(&id)
    }

    pub fn scan_folders(&self) -> impl Iterator<Item = &ScanFolderRow> {
        self.scan_folders.values()
    }

    // ---- sources ----

    /// Return the source named `database_name`, creating it if needed. The
    /// flag is true when the row was created.
    pub fn get_or_create_source(
        &mut self,
        scan_folder_id: ScanFolderId,
        database_name: &str,
        relative_path: &str,
    ) -> (SourceId, bool) {
        if let Some(&id) = self.source_by_name.get(&name_key(database_name)) {
            if let Some(row) = self.sources.get_mut(&id) {
                // The owning folder may change when an override appears or
                // disappears.
                row.scan_folder_id = scan_folder_id;
                row.relative_path = relative_path.to_string();
            }
            return (id, false);
        }

        let id = self.allocate_id();
        let uuid = source_uuid(database_name);
        self.sources.insert(
            id,
            SourceRow {
                id,
                scan_folder_id,
                database_name: database_name.to_string(),
                relative_path: relative_path.to_string(),
                uuid,
                analysis_fingerprint: String::new(),
            },
        );
        self.source_by_name.insert(name_key(database_name), id);
        self.source_by_uuid.insert(uuid, id);
        (id, true)
    }

    pub fn source(&self, id: SourceId) -> Option<&SourceRow> {
        self.sources.get(&id)
    }

    pub fn source_mut(&mut self, id: SourceId) -> Option<&mut SourceRow> {
        self.sources.get_mut(&id)
    }

    pub fn source_by_name(&self, database_name: &str) -> Option<&SourceRow> {
        self.source_by_name
            .get(&name_key(database_name))
            .and_then(|id| self.sources.get(id))
    }

    pub fn source_by_uuid(&self, uuid: &Uuid) -> Option<&SourceRow> {
        self.source_by_uuid
            .get(uuid)
            .and_then(|id| self.sources.get(id))
    }

    pub fn sources(&self) -> impl Iterator<Item = &SourceRow> {
        self.sources.values()
    }

    /// Sources whose database name lies strictly below `folder_name`.
    pub fn sources_under(&self, folder_name: &str) -> Vec<&SourceRow> {
        self.sources
            .values()
            .filter(|s| {
                strip_dir_prefix(&s.database_name, folder_name).is_some_and(|rest| !rest.is_empty())
            })
            .collect()
    }

    /// Absolute path of a source on disk, through its scan folder row.
    pub fn absolute_path_of(&self, source: &SourceRow) -> Option<PathBuf> {
        let folder = self.scan_folders.get(&source.scan_folder_id)?;
        Some(folder.path.join(&source.relative_path))
    }

    /// Remove a source together with its jobs, products and product
    /// dependency rows. Dependency edges are left to the caller.
    pub fn remove_source(&mut self, id: SourceId) -> Option<SourceRow> {
        let row = self.sources.remove(&id)?;
        self.source_by_name.remove(&name_key(&row.database_name));
        self.source_by_uuid.remove(&row.uuid);
        let jobs: Vec<JobId> = self
            .jobs_by_source
            .get(&id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        for job in jobs {
            self.remove_job(job);
        }
        Some(row)
    }

    // ---- jobs ----

    pub fn job(&self, id: JobId) -> Option<&JobRow> {
        self.jobs.get(&id)
    }

    pub fn job_mut(&mut self, id: JobId) -> Option<&mut JobRow> {
        self.jobs.get_mut(&id)
    }

    pub fn jobs_for_source(&self, source_id: SourceId) -> Vec<&JobRow> {
        self.jobs_by_source
            .get(&source_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.jobs.get(id))
            .collect()
    }

    pub fn find_job(&self, key: &JobKey) -> Option<&JobRow> {
        self.jobs_for_source(key.source_id).into_iter().find(|j| {
            j.platform == key.platform && j.job_key == key.job_key && j.builder_guid == key.builder_guid
        })
    }

    /// Insert or update the job row for `key` and return its id.
    pub fn upsert_job(
        &mut self,
        key: &JobKey,
        fingerprint: u64,
        job_run_key: u64,
        status: JobStatus,
        fail_log: Vec<String>,
    ) -> JobId {
        if let Some(id) = self.find_job(key).map(|j| j.id) {
            if let Some(row) = self.jobs.get_mut(&id) {
                row.fingerprint = fingerprint;
                row.job_run_key = job_run_key;
                row.status = status;
                row.fail_log = fail_log;
            }
            return id;
        }

        let id = self.allocate_id();
        self.jobs.insert(
            id,
            JobRow {
                id,
                source_id: key.source_id,
                platform: key.platform.clone(),
                job_key: key.job_key.clone(),
                builder_guid: key.builder_guid,
                fingerprint,
                job_run_key,
                status,
                fail_log,
            },
        );
        self.jobs_by_source
            .entry(key.source_id)
            .or_default()
            .insert(id);
        id
    }

    /// Remove a job row and its products.
    pub fn remove_job(&mut self, id: JobId) -> Option<JobRow> {
        let row = self.jobs.remove(&id)?;
        if let Some(ids) = self.jobs_by_source.get_mut(&row.source_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.jobs_by_source.remove(&row.source_id);
            }
        }
        let products: Vec<ProductId> = self
            .products_by_job
            .remove(&id)
            .map(|ids| ids.into_iter().collect())
            .unwrap_or_default();
        for product in products {
            self.remove_product(product);
        }
        Some(row)
    }

    // ---- products ----

    pub fn products_for_job(&self, job_id: JobId) -> Vec<&ProductRow> {
        self.products_by_job
            .get(&job_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.products.get(id))
            .collect()
    }

    pub fn products(&self) -> impl Iterator<Item = &ProductRow> {
        self.products.values()
    }

    pub fn product_by_path(&self, product_path: &str) -> Option<&ProductRow> {
        self.product_by_path
            .get(&name_key(product_path))
            .and_then(|id| self.products.get(id))
    }

    /// Insert a product, or update the row that already has its path.
    pub fn upsert_product(&mut self, mut row: ProductRow) -> ProductId {
        let key = name_key(&row.product_path);
        if let Some(&id) = self.product_by_path.get(&key) {
            if let Some(old) = self.products.get(&id) {
                if old.job_id != row.job_id {
                    let old_job = old.job_id;
                    if let Some(ids) = self.products_by_job.get_mut(&old_job) {
                        ids.remove(&id);
                    }
                }
            }
            row.id = id;
        } else {
            row.id = self.allocate_id();
        }

        let id = row.id;
        self.products_by_job
            .entry(row.job_id)
            .or_default()
            .insert(id);
        self.product_by_path.insert(key, id);
        self.products.insert(id, row);
        id
    }

    pub fn remove_product(&mut self, id: ProductId) -> Option<ProductRow> {
        let row = self.products.remove(&id)?;
        self.product_by_path.remove(&name_key(&row.product_path));
        if let Some(ids) = self.products_by_job.get_mut(&row.job_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.products_by_job.remove(&row.job_id);
            }
        }
        self.product_dependencies.remove(&id);
        Some(row)
    }

    pub fn set_product_dependencies(&mut self, product_id: ProductId, deps: Vec<ProductDependency>) {
        if deps.is_empty() {
            self.product_dependencies.remove(&product_id);
        } else {
            self.product_dependencies.insert(product_id, deps);
        }
    }

    pub fn product_dependencies(&self, product_id: ProductId) -> &[ProductDependency] {
        self.product_dependencies
            .get(&product_id)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    // ---- builders ----

    pub fn builder_info(&self) -> &[BuilderDescriptor] {
        &self.builder_info
    }

    pub fn set_builder_info(&mut self, builders: Vec<BuilderDescriptor>) {
        self.builder_info = builders;
    }
}
