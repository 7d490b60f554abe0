// src/registry/builders.rs

//! Registered builders and builder dirtiness.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::builder::{Builder, BuilderDescriptor};
use crate::db::AssetDatabase;

/// Outcome of [`BuilderRegistry::compute_builder_dirty`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuilderDirtiness {
    /// Bus ids of builders whose cached analysis can no longer be trusted.
    pub dirty: BTreeSet<Uuid>,
    /// A builder appeared, disappeared, or changed what it matches.
    pub builders_added_or_removed: bool,
}

impl BuilderDirtiness {
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }
}

/// Explicitly constructed set of builders owned by the conductor.
#[derive(Debug, Default)]
pub struct BuilderRegistry {
    builders: Vec<Arc<dyn Builder>>,
    by_name: HashMap<String, usize>,
    by_bus_id: HashMap<Uuid, usize>,
    /// `None` until dirtiness has been computed for this session.
    dirtiness: Option<BuilderDirtiness>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builder, replacing any builder with the same bus id.
    pub fn register(&mut self, builder: Arc<dyn Builder>) {
        let descriptor = builder.descriptor();
        debug!(builder = %descriptor.name, bus_id = %descriptor.bus_id, "registering builder");

        if let Some(&idx) = self.by_bus_id.get(&descriptor.bus_id) {
            let old_name = self.builders[idx].descriptor().name.clone();
            self.by_name.remove(&old_name);
            self.by_name.insert(descriptor.name.clone(), idx);
            self.builders[idx] = builder;
            return;
        }

        let idx = self.builders.len();
        self.by_name.insert(descriptor.name.clone(), idx);
        self.by_bus_id.insert(descriptor.bus_id, idx);
        self.builders.push(builder);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Builder>> {
        self.by_name.get(name).map(|&idx| &self.builders[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Builder>> {
        self.builders.iter()
    }

    pub fn descriptors(&self) -> Vec<BuilderDescriptor> {
        self.builders
            .iter()
            .map(|b| b.descriptor().clone())
            .collect()
    }

    /// Whether a builder must be treated as dirty. Every builder is dirty
    /// until [`compute_builder_dirty`](Self::compute_builder_dirty) has run.
    pub fn is_builder_dirty(&self, bus_id: &Uuid) -> bool {
        match &self.dirtiness {
            Some(d) => d.dirty.contains(bus_id),
            None => true,
        }
    }

    /// Whether the set of builders (or what they match) changed since the
    /// last session. Conservatively true before the first computation.
    pub fn builders_added_or_removed(&self) -> bool {
        self.dirtiness
            .as_ref()
            .map(|d| d.builders_added_or_removed)
            .unwrap_or(true)
    }

    /// Currently dirty builders.
    pub fn dirty_builders(&self) -> BTreeSet<Uuid> {
        match &self.dirtiness {
            Some(d) => d.dirty.clone(),
            None => self
                .builders
                .iter()
                .map(|b| b.descriptor().bus_id)
                .collect(),
        }
    }

    /// Compare the registered builders with the set persisted by the previous
    /// computation, then persist the current set.
    pub fn compute_builder_dirty(&mut self, db: &mut AssetDatabase) -> BuilderDirtiness {
        let previous: HashMap<Uuid, BuilderDescriptor> = db
            .builder_info()
            .iter()
            .map(|d| (d.bus_id, d.clone()))
            .collect();

        let mut report = BuilderDirtiness::default();

        for builder in self.builders.iter() {
            let current = builder.descriptor();
            match previous.get(&current.bus_id) {
                None => {
                    debug!(builder = %current.name, "builder is new");
                    report.dirty.insert(current.bus_id);
                    report.builders_added_or_removed = true;
                }
                Some(prior) if prior.patterns != current.patterns => {
                    debug!(builder = %current.name, "builder patterns changed");
                    report.dirty.insert(current.bus_id);
                    report.builders_added_or_removed = true;
                }
                Some(prior)
                    if prior.version != current.version
                        || prior.analysis_fingerprint != current.analysis_fingerprint =>
                {
                    debug!(builder = %current.name, "builder version or fingerprint changed");
                    report.dirty.insert(current.bus_id);
                }
                Some(_) => {}
            }
        }

        if previous
            .keys()
            .any(|id| !self.by_bus_id.contains_key(id))
        {
            debug!("a previously registered builder is gone");
            report.builders_added_or_removed = true;
        }

        info!(
            dirty = report.dirty_count(),
            added_or_removed = report.builders_added_or_removed,
            "computed builder dirtiness"
        );

        db.set_builder_info(self.descriptors());
        self.dirtiness = Some(report.clone());
        report
    }
}
