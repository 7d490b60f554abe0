// src/engine/results.rs

//! Job results: product reconciliation, failure records and legacy ids.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::builder::{AssetId, Builder};
use crate::db::{JobId, JobKey, JobStatus, ProductRow, SourceRow};
use crate::engine::analyze::is_create_jobs_failure;
use crate::engine::core::Conductor;
use crate::engine::{AssetNotification, AssetNotificationKind, Notification};
use crate::exec::{JobOutcome, JobState, RcJob};
use crate::fingerprint::FAILED_FINGERPRINT;
use crate::path_utils::name_key;

/// Legacy ids announced for a product, in order: the id derived from the
/// product path, the id derived from the case-sensitive source name, then
/// one per legacy sub id. Ids equal to the product's own id, and repeats,
/// are skipped.
pub fn legacy_asset_ids(
    source_uuid: Uuid,
    source_name: &str,
    legacy_guid: Uuid,
    sub_id: u32,
    legacy_sub_ids: &[u32],
) -> Vec<AssetId> {
    let own = AssetId::new(source_uuid, sub_id);
    let case_sensitive = Uuid::new_v5(&Uuid::NAMESPACE_URL, source_name.replace('\\', "/").as_bytes());

    let candidates = [AssetId::new(legacy_guid, 0), AssetId::new(case_sensitive, sub_id)]
        .into_iter()
        .chain(legacy_sub_ids.iter().map(|s| AssetId::new(source_uuid, *s)));

    let mut ids: Vec<AssetId> = Vec::new();
    for id in candidates {
        if id != own && !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// Identity a product had in pipelines that keyed products by path.
pub fn legacy_guid_for(product_path: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name_key(product_path).as_bytes())
}

impl Conductor {
    pub(crate) fn handle_job_finished(&mut self, outcome: JobOutcome) {
        let entry = outcome.details.entry.clone();
        let run_key = outcome.details.job_run_key;
        if !self.finish_in_flight(&entry, run_key) {
            warn!(job = %entry, run_key, "result for a job that is not in flight; ignoring");
            return;
        }

        if is_create_jobs_failure(&outcome.details) {
            warn!(
                source = %entry.source,
                job_key = %entry.job_key,
                messages = ?outcome.messages,
                "create jobs failed"
            );
            return;
        }

        match outcome.state {
            JobState::Completed if outcome.details.auto_succeed => {
                self.publish(Notification::InputAssetProcessed {
                    source: entry.source.clone(),
                    platform: entry.platform.clone(),
                });
            }
            JobState::Completed => self.asset_processed(outcome),
            JobState::Failed | JobState::Crashed | JobState::Terminated => self.asset_failed(outcome),
            JobState::Cancelled => self.asset_cancelled(&outcome),
            JobState::Pending | JobState::Processing => {
                error!(job = %entry, state = ?outcome.state, "job reported a non-terminal state");
            }
        }
    }

    /// A job completed: store its products and fingerprint, announce what
    /// changed and re-queue the sources that depend on it.
    pub(crate) fn asset_processed(&mut self, outcome: JobOutcome) {
        let entry = outcome.details.entry.clone();
        let Some(source) = self.db.source_by_name(&entry.source).cloned() else {
            warn!(source = %entry.source, "source removed while its job was running; dropping products");
            for product in outcome.products.iter() {
                self.delete_product_file(&entry.platform, &product.cache_path);
            }
            return;
        };

        if let Some((owner_job, owner)) = self.foreign_owner(&source, &outcome) {
            error!(
                source = %entry.source,
                owner = %owner,
                "job produced a product that belongs to another source"
            );
            // The owner's product may have been overwritten; rebuild it.
            if let Some(job) = self.db.job_mut(owner_job) {
                job.fingerprint = FAILED_FINGERPRINT;
            }
            self.dispatch_duplicate_product_failure(outcome, &owner);
            self.requeue_sources(BTreeSet::from([owner]));
            return;
        }

        let key = JobKey {
            source_id: source.id,
            platform: entry.platform.clone(),
            job_key: entry.job_key.clone(),
            builder_guid: entry.builder_guid,
        };
        let job_id = self.db.upsert_job(
            &key,
            outcome.fingerprint,
            outcome.details.job_run_key,
            JobStatus::Completed,
            Vec::new(),
        );
        let is_root = self.source_is_root(source.id);

        let previous: Vec<ProductRow> = self
            .db
            .products_for_job(job_id)
            .into_iter()
            .cloned()
            .collect();
        let current: HashSet<String> = outcome
            .products
            .iter()
            .map(|p| name_key(&p.cache_path))
            .collect();

        for old in previous.iter().filter(|o| !current.contains(&name_key(&o.product_path))) {
            debug!(product = %old.product_path, "product no longer produced");
            self.delete_product_file(&entry.platform, &old.product_path);
            let product_path = self.product_relative_path(&entry.platform, is_root, &old.product_path);
            self.publish(Notification::AssetMessage {
                platform: entry.platform.clone(),
                message: AssetNotification {
                    kind: AssetNotificationKind::Removed,
                    product_path,
                    asset_id: AssetId::new(source.uuid, old.sub_id),
                    legacy_asset_ids: Vec::new(),
                    asset_type: old.asset_type,
                },
            });
            self.db.remove_product(old.id);
        }

        for placed in outcome.products.iter() {
            let prior = previous
                .iter()
                .find(|o| name_key(&o.product_path) == name_key(&placed.cache_path));
            let changed = prior.is_none_or(|o| {
                o.hash != placed.hash
                    || o.sub_id != placed.product.sub_id
                    || o.asset_type != placed.product.asset_type
                    || o.legacy_sub_ids != placed.product.legacy_sub_ids
            });

            let legacy_guid = legacy_guid_for(&placed.cache_path);
            let product_id = self.db.upsert_product(ProductRow {
                id: 0,
                job_id,
                product_path: placed.cache_path.clone(),
                sub_id: placed.product.sub_id,
                asset_type: placed.product.asset_type,
                legacy_guid,
                hash: placed.hash.clone(),
                legacy_sub_ids: placed.product.legacy_sub_ids.clone(),
            });
            self.db
                .set_product_dependencies(product_id, placed.product.dependencies.clone());

            if changed {
                self.publish(Notification::AssetMessage {
                    platform: entry.platform.clone(),
                    message: AssetNotification {
                        kind: AssetNotificationKind::Changed,
                        product_path: placed.relative_path.clone(),
                        asset_id: AssetId::new(source.uuid, placed.product.sub_id),
                        legacy_asset_ids: legacy_asset_ids(
                            source.uuid,
                            &source.database_name,
                            legacy_guid,
                            placed.product.sub_id,
                            &placed.product.legacy_sub_ids,
                        ),
                        asset_type: placed.product.asset_type,
                    },
                });
            }
        }

        info!(
            source = %entry.source,
            platform = %entry.platform,
            job_key = %entry.job_key,
            products = outcome.products.len(),
            "job completed"
        );
        self.publish(Notification::InputAssetProcessed {
            source: entry.source.clone(),
            platform: entry.platform.clone(),
        });
        self.dirty = true;

        let dependents = self.db.dependencies.dependents_of(&entry.source);
        self.requeue_sources(dependents);
    }

    /// Job and database name of another source that already owns one of the
    /// products in `outcome`.
    fn foreign_owner(&self, source: &SourceRow, outcome: &JobOutcome) -> Option<(JobId, String)> {
        outcome.products.iter().find_map(|placed| {
            let existing = self.db.product_by_path(&placed.cache_path)?;
            let job = self.db.job(existing.job_id)?;
            if job.source_id == source.id {
                return None;
            }
            self.db
                .source(job.source_id)
                .map(|s| (job.id, s.database_name.clone()))
        })
    }

    /// Run the job again as a critical auto-failing job so the failure is
    /// reported like any other job result.
    fn dispatch_duplicate_product_failure(&mut self, outcome: JobOutcome, owner: &str) {
        let Some(builder) = self
            .builders
            .iter()
            .find(|b| b.descriptor().bus_id == outcome.details.entry.builder_guid)
            .cloned()
        else {
            warn!(job = %outcome.details.entry, "builder gone; recording duplicate product failure directly");
            let mut failed = outcome;
            failed.state = JobState::Failed;
            failed.messages.push(format!("product already produced by {}", owner));
            self.asset_failed(failed);
            return;
        };

        let mut details = outcome.details;
        details.critical = true;
        details.auto_fail = true;
        details.auto_succeed = false;
        details.fail_log = outcome.messages;
        details
            .fail_log
            .push(format!("product already produced by {}", owner));
        self.dispatch_job(RcJob::new(details, builder));
    }

    /// A job failed: record it without advancing the fingerprint. Products
    /// and sibling jobs are untouched.
    pub(crate) fn asset_failed(&mut self, outcome: JobOutcome) {
        let entry = &outcome.details.entry;
        warn!(
            source = %entry.source,
            platform = %entry.platform,
            job_key = %entry.job_key,
            state = ?outcome.state,
            "job failed"
        );
        let Some(source_id) = self.db.source_by_name(&entry.source).map(|s| s.id) else {
            return;
        };

        let key = JobKey {
            source_id,
            platform: entry.platform.clone(),
            job_key: entry.job_key.clone(),
            builder_guid: entry.builder_guid,
        };
        let fingerprint = self
            .db
            .find_job(&key)
            .map(|j| j.fingerprint)
            .unwrap_or(FAILED_FINGERPRINT);
        self.db.upsert_job(
            &key,
            fingerprint,
            outcome.details.job_run_key,
            JobStatus::Failed,
            outcome.messages.clone(),
        );
        self.dirty = true;
    }

    /// A cancelled job leaves the database as it was.
    pub(crate) fn asset_cancelled(&self, outcome: &JobOutcome) {
        info!(job = %outcome.details.entry, "job cancelled");
    }
}
