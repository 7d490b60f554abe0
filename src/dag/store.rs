// src/dag/store.rs

//! Edge arena for source file dependencies.
//!
//! Edges live in a single id-keyed arena; lookups by declaring source and by
//! target go through secondary indexes that are rebuilt after loading.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::dag::entry::{DependencyId, DependencyTarget, SourceFileDependencyEntry};
use crate::path_utils::name_key;
use crate::types::DependencyType;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyStore {
    next_id: DependencyId,
    edges: BTreeMap<DependencyId, SourceFileDependencyEntry>,

    #[serde(skip)]
    by_source: HashMap<String, BTreeSet<DependencyId>>,
    #[serde(skip)]
    by_target: HashMap<String, BTreeSet<DependencyId>>,
}

impl DependencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the secondary indexes from the arena.
    pub fn rebuild_indexes(&mut self) {
        self.by_source.clear();
        self.by_target.clear();
        let edges: Vec<SourceFileDependencyEntry> = self.edges.values().cloned().collect();
        for edge in edges.iter() {
            self.index(edge);
        }
        self.next_id = self
            .edges
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0)
            .max(self.next_id);
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edges(&self) -> impl Iterator<Item = &SourceFileDependencyEntry> {
        self.edges.values()
    }

    pub fn get(&self, id: DependencyId) -> Option<&SourceFileDependencyEntry> {
        self.edges.get(&id)
    }

    /// Store an edge and return its id. An identical edge that already exists
    /// is kept and its id returned.
    pub fn set_source_file_dependency(&mut self, mut entry: SourceFileDependencyEntry) -> DependencyId {
        if let Some(existing) = self
            .ids_for_source(&entry.source)
            .into_iter()
            .find(|id| self.edges.get(id).is_some_and(|e| e.same_edge(&entry)))
        {
            return existing;
        }

        if entry.id != 0 {
            self.remove_source_file_dependency(entry.id);
        } else {
            self.next_id += 1;
            entry.id = self.next_id;
        }
        self.next_id = self.next_id.max(entry.id);

        debug!(
            source = %entry.source,
            target = %entry.target,
            dependency_type = ?entry.dependency_type,
            "storing source dependency"
        );
        self.index(&entry);
        let id = entry.id;
        self.edges.insert(id, entry);
        id
    }

    pub fn remove_source_file_dependency(&mut self, id: DependencyId) -> Option<SourceFileDependencyEntry> {
        let entry = self.edges.remove(&id)?;
        self.unindex(&entry);
        Some(entry)
    }

    /// Edges declared by `source`.
    pub fn dependencies_of(&self, source: &str) -> Vec<&SourceFileDependencyEntry> {
        self.ids_for_source(source)
            .into_iter()
            .filter_map(|id| self.edges.get(&id))
            .collect()
    }

    /// Sources with a resolved edge pointing at `target`.
    pub fn dependents_of(&self, target: &str) -> BTreeSet<String> {
        let key = DependencyTarget::Resolved(target.to_string()).index_key();
        self.by_target
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id))
            .map(|e| e.source.clone())
            .collect()
    }

    /// Replace the edges `builder_guid` declared for `source` with `declared`.
    ///
    /// Edges no longer declared are removed, new ones are added, unchanged
    /// ones keep their ids.
    pub fn update_source_file_dependency_database(
        &mut self,
        source: &str,
        builder_guid: Uuid,
        declared: Vec<(DependencyTarget, DependencyType)>,
    ) {
        let wanted: Vec<SourceFileDependencyEntry> = declared
            .into_iter()
            // A source never depends on itself.
            .filter(|(target, _)| {
                target
                    .resolved_name()
                    .map(|n| name_key(n) != name_key(source))
                    .unwrap_or(true)
            })
            .map(|(target, ty)| SourceFileDependencyEntry::new(builder_guid, source, target, ty))
            .collect();

        let stale: Vec<DependencyId> = self
            .dependencies_of(source)
            .into_iter()
            .filter(|e| e.builder_guid == builder_guid)
            .filter(|e| !wanted.iter().any(|w| w.same_edge(e)))
            .map(|e| e.id)
            .collect();

        for id in stale {
            self.remove_source_file_dependency(id);
        }
        for entry in wanted {
            self.set_source_file_dependency(entry);
        }
    }

    /// Rewrite every placeholder that names the newly registered source,
    /// by database name, scan-folder relative path or UUID.
    ///
    /// Returns the declaring sources of the rewritten edges. Calling it again
    /// for the same source finds nothing and returns an empty set.
    pub fn resolve_placeholders(
        &mut self,
        database_name: &str,
        relative_path: &str,
        uuid: Uuid,
    ) -> BTreeSet<String> {
        let keys = [
            DependencyTarget::PendingPath(database_name.to_string()).index_key(),
            DependencyTarget::PendingPath(relative_path.to_string()).index_key(),
            DependencyTarget::PendingUuid(uuid).index_key(),
        ];

        let ids: BTreeSet<DependencyId> = keys
            .iter()
            .filter_map(|k| self.by_target.get(k))
            .flatten()
            .copied()
            .collect();

        let mut dependents = BTreeSet::new();
        for id in ids {
            let Some(mut entry) = self.remove_source_file_dependency(id) else {
                continue;
            };
            if name_key(&entry.source) == name_key(database_name) {
                continue;
            }
            debug!(
                source = %entry.source,
                placeholder = %entry.target,
                resolved = %database_name,
                "placeholder dependency resolved"
            );
            entry.target = DependencyTarget::Resolved(database_name.to_string());
            dependents.insert(entry.source.clone());
            self.set_source_file_dependency(entry);
        }
        dependents
    }

    /// Turn every edge pointing at `database_name` back into a path
    /// placeholder; used when that source is deleted. Returns the declaring
    /// sources.
    pub fn revert_to_placeholders(&mut self, database_name: &str) -> BTreeSet<String> {
        let key = DependencyTarget::Resolved(database_name.to_string()).index_key();
        let ids: Vec<DependencyId> = self
            .by_target
            .get(&key)
            .into_iter()
            .flatten()
            .copied()
            .collect();

        let mut dependents = BTreeSet::new();
        for id in ids {
            if let Some(mut entry) = self.remove_source_file_dependency(id) {
                entry.target = DependencyTarget::PendingPath(database_name.to_string());
                dependents.insert(entry.source.clone());
                self.set_source_file_dependency(entry);
            }
        }
        dependents
    }

    /// Drop every edge declared by `source`.
    pub fn remove_edges_of_source(&mut self, source: &str) -> usize {
        let ids = self.ids_for_source(source);
        let count = ids.len();
        for id in ids {
            self.remove_source_file_dependency(id);
        }
        count
    }

    /// Drop every edge declared by `source` through `builder_guid`.
    pub fn remove_edges_of_builder(&mut self, source: &str, builder_guid: Uuid) {
        let ids: Vec<DependencyId> = self
            .dependencies_of(source)
            .into_iter()
            .filter(|e| e.builder_guid == builder_guid)
            .map(|e| e.id)
            .collect();
        for id in ids {
            self.remove_source_file_dependency(id);
        }
    }

    fn ids_for_source(&self, source: &str) -> Vec<DependencyId> {
        self.by_source
            .get(&name_key(source))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn index(&mut self, entry: &SourceFileDependencyEntry) {
        self.by_source
            .entry(name_key(&entry.source))
            .or_default()
            .insert(entry.id);
        self.by_target
            .entry(entry.target.index_key())
            .or_default()
            .insert(entry.id);
    }

    fn unindex(&mut self, entry: &SourceFileDependencyEntry) {
        let source_key = name_key(&entry.source);
        if let Some(ids) = self.by_source.get_mut(&source_key) {
            ids.remove(&entry.id);
            if ids.is_empty() {
                self.by_source.remove(&source_key);
            }
        }
        let target_key = entry.target.index_key();
        if let Some(ids) = self.by_target.get_mut(&target_key) {
            ids.remove(&entry.id);
            if ids.is_empty() {
                self.by_target.remove(&target_key);
            }
        }
    }
}
