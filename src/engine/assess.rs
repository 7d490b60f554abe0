// src/engine/assess.rs

//! Turning raw file events into conductor work.
//!
//! Added and modified files are resolved against the scan folders (sidecars,
//! excludes, overrides, folders) before analysis. Deleted files remove their
//! source, its products and its outgoing edges; deleting a cache product
//! only forces the owning job to run again.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::builder::AssetId;
use crate::db::{JobId, SourceId};
use crate::engine::core::{Conductor, FileEventKind, QueuedFile};
use crate::engine::scan;
use crate::engine::{AssetNotification, AssetNotificationKind, Notification};
use crate::fingerprint::FAILED_FINGERPRINT;
use crate::path_utils::{eq_ignore_case, name_key, normalize_path, strip_dir_prefix};

impl Conductor {
    pub(crate) fn assess(&mut self, file: QueuedFile) {
        match file.kind {
            FileEventKind::Deleted => self.assess_deleted_file(&file.path),
            FileEventKind::Added => self.assess_added_file(&file.path, false),
            FileEventKind::Scanned => self.assess_added_file(&file.path, true),
            FileEventKind::Modified => self.assess_modified_file(&file.path),
        }
    }

    /// A file (or folder) appeared. `from_scan` marks files found by the
    /// initial scan, which may skip analysis when nothing changed.
    pub(crate) fn assess_added_file(&mut self, path: &Path, from_scan: bool) {
        if self.cache_relative(path).is_some() {
            return;
        }

        if self.fs.is_dir(path) {
            let folder = self.registry.scan_folders.scan_folder_for_file(path).cloned();
            let recurse = folder.as_ref().map(|f| f.recurse).unwrap_or(true);
            let files = scan::files_under(self.fs.as_ref(), path, recurse, &self.settings.cache_root);
            debug!(folder = ?path, files = files.len(), "folder added; scanning");
            let kind = if from_scan {
                FileEventKind::Scanned
            } else {
                FileEventKind::Added
            };
            for file in files {
                self.queue_file(file, kind);
            }
            return;
        }

        self.assess_file(path, from_scan);
    }

    pub(crate) fn assess_modified_file(&mut self, path: &Path) {
        if self.cache_relative(path).is_some() || self.fs.is_dir(path) {
            return;
        }
        self.assess_file(path, false);
    }

    fn assess_file(&mut self, path: &Path, from_scan: bool) {
        if let Some(source) = self.registry.recognizers.source_for_sidecar(path) {
            if self.fs.is_file(&source) {
                debug!(sidecar = ?path, source = ?source, "sidecar changed; re-assessing source");
                self.queue_file(source, FileEventKind::Modified);
            }
            return;
        }

        let Some(mut rel) = self.registry.scan_folders.convert_to_relative_path(path) else {
            debug!(path = ?path, "file is outside every scan folder; ignoring");
            return;
        };
        if self.registry.recognizers.is_excluded(&rel.relative_path) {
            debug!(file = %rel.database_name, "file is excluded; ignoring");
            return;
        }
        if !self.fs.is_file(path) {
            // Gone again before we got to it.
            self.assess_deleted_file(path);
            return;
        }

        let mut target = path.to_path_buf();
        if let Some(winner) = self.registry.scan_folders.get_overriding_file(
            self.fs.as_ref(),
            &rel.database_name,
            &rel.scan_folder,
        ) {
            match self.registry.scan_folders.convert_to_relative_path(&winner) {
                Some(winner_rel) => {
                    debug!(file = ?path, winner = ?winner, "redirecting to overriding file");
                    target = winner;
                    rel = winner_rel;
                }
                None => return,
            }
        }

        if self.has_jobs_in_flight(&rel.database_name) {
            let kind = if from_scan {
                FileEventKind::Scanned
            } else {
                FileEventKind::Modified
            };
            self.defer(&rel.database_name, QueuedFile { path: target, kind });
            return;
        }

        self.analyze_source(&target, &rel, from_scan);
    }

    /// A file or folder went away.
    pub(crate) fn assess_deleted_file(&mut self, path: &Path) {
        if let Some(cache_rel) = self.cache_relative(path) {
            self.cache_product_deleted(path, &cache_rel);
            return;
        }

        if self.fs.exists(path) {
            debug!(path = ?path, "deleted path exists again; treating as modified");
            if self.fs.is_dir(path) {
                self.assess_added_file(path, false);
            } else if self.fs.is_file(path) {
                self.assess_file(path, false);
            }
            return;
        }

        if let Some(source) = self.registry.recognizers.source_for_sidecar(path) {
            if self.fs.is_file(&source) {
                debug!(sidecar = ?path, "sidecar deleted; re-assessing source");
                self.queue_file(source, FileEventKind::Modified);
            }
            return;
        }

        let Some(rel) = self.registry.scan_folders.convert_to_relative_path(path) else {
            return;
        };

        let contained: Vec<(SourceId, String)> = self
            .db
            .sources_under(&rel.database_name)
            .into_iter()
            .map(|s| (s.id, s.database_name.clone()))
            .collect();
        if !contained.is_empty() {
            info!(folder = %rel.database_name, sources = contained.len(), "folder deleted");
            for (id, name) in contained {
                let still_there = self
                    .db
                    .source(id)
                    .and_then(|s| self.db.absolute_path_of(s))
                    .is_some_and(|p| self.fs.is_file(&p));
                if !still_there {
                    self.delete_source_file(id, &name);
                }
            }
            return;
        }

        let Some(source) = self.db.source_by_name(&rel.database_name) else {
            debug!(file = %rel.database_name, "deleted file was never registered");
            return;
        };
        let (source_id, owner_folder) = (source.id, source.scan_folder_id);

        let owned_here = self
            .db
            .scan_folder(owner_folder)
            .is_some_and(|f| eq_ignore_case(&normalize_path(&f.path), &normalize_path(&rel.scan_folder)));
        if !owned_here {
            // A shadowed copy went away; the overriding file is unaffected.
            debug!(file = ?path, "deleted file was overridden; ignoring");
            return;
        }

        self.delete_source_file(source_id, &rel.database_name);
    }

    /// Delete a source, then let the next scan folder that has the same
    /// database name take over.
    fn delete_source_file(&mut self, source_id: SourceId, database_name: &str) {
        if self.has_jobs_in_flight(database_name) {
            if let Some(path) = self
                .db
                .source(source_id)
                .and_then(|s| self.db.absolute_path_of(s))
            {
                self.defer(
                    database_name,
                    QueuedFile {
                        path,
                        kind: FileEventKind::Deleted,
                    },
                );
            }
            return;
        }

        self.delete_source(source_id);

        if let Some(next) = self
            .registry
            .scan_folders
            .find_first_matching_file(self.fs.as_ref(), database_name)
        {
            info!(file = %database_name, revealed = ?next, "override removed; next file takes over");
            self.queue_file(next, FileEventKind::Added);
        }
    }

    /// Remove a source with all of its products and outgoing edges. Edges
    /// pointing at it become placeholders and their sources are re-queued.
    pub(crate) fn delete_source(&mut self, source_id: SourceId) {
        let Some(source) = self.db.source(source_id).cloned() else {
            return;
        };
        info!(source = %source.database_name, "removing source");

        let jobs: Vec<JobId> = self
            .db
            .jobs_for_source(source_id)
            .into_iter()
            .map(|j| j.id)
            .collect();
        for job in jobs {
            self.remove_job_with_products(job);
        }

        self.db.dependencies.remove_edges_of_source(&source.database_name);
        let dependents = self
            .db
            .dependencies
            .revert_to_placeholders(&source.database_name);
        if let Some(path) = self.db.absolute_path_of(&source) {
            self.file_cache.invalidate(&path);
        }
        self.db.remove_source(source_id);
        self.dirty = true;

        self.requeue_sources(dependents);
    }

    /// Delete every product of a job from disk and the database, publishing
    /// a removal for each, then drop the job row.
    pub(crate) fn remove_job_with_products(&mut self, job_id: JobId) {
        let Some(job) = self.db.job(job_id).cloned() else {
            return;
        };
        let source_uuid = self
            .db
            .source(job.source_id)
            .map(|s| s.uuid)
            .unwrap_or_default();
        let is_root = self.source_is_root(job.source_id);

        let products: Vec<_> = self
            .db
            .products_for_job(job_id)
            .into_iter()
            .cloned()
            .collect();
        for product in products {
            self.delete_product_file(&job.platform, &product.product_path);
            let product_path = self.product_relative_path(&job.platform, is_root, &product.product_path);
            self.publish(Notification::AssetMessage {
                platform: job.platform.clone(),
                message: AssetNotification {
                    kind: AssetNotificationKind::Removed,
                    product_path,
                    asset_id: AssetId::new(source_uuid, product.sub_id),
                    legacy_asset_ids: Vec::new(),
                    asset_type: product.asset_type,
                },
            });
            self.db.remove_product(product.id);
        }

        debug!(job_key = %job.job_key, platform = %job.platform, "removing job");
        self.db.remove_job(job_id);
        self.dirty = true;
    }

    /// A file below the cache root was deleted. If it (or a folder of them)
    /// was a known product, its job must run again.
    fn cache_product_deleted(&mut self, path: &Path, cache_rel: &str) {
        let temp = normalize_path(&self.temp_root());
        if strip_dir_prefix(&normalize_path(path), &temp).is_some() || cache_rel.is_empty() {
            return;
        }

        let key = name_key(cache_rel);
        let jobs: BTreeSet<JobId> = self
            .db
            .products()
            .filter(|p| {
                let product = name_key(&p.product_path);
                product == key || strip_dir_prefix(&product, &key).is_some()
            })
            .map(|p| p.job_id)
            .collect();

        let mut sources = BTreeSet::new();
        for job_id in jobs {
            let Some(job) = self.db.job_mut(job_id) else {
                continue;
            };
            warn!(product = %cache_rel, job_key = %job.job_key, "product deleted from cache; job must run again");
            job.fingerprint = FAILED_FINGERPRINT;
            let source_id = job.source_id;
            self.dirty = true;
            if let Some(source) = self.db.source(source_id) {
                sources.insert(source.database_name.clone());
            }
        }
        self.requeue_sources(sources);
    }
}
