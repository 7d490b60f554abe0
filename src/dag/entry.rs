// src/dag/entry.rs

//! Source dependency edge rows.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::path_utils::name_key;
use crate::types::DependencyType;

/// Arena id of a [`SourceFileDependencyEntry`].
pub type DependencyId = u64;

/// What an edge points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyTarget {
    /// Database name of a known source.
    Resolved(String),
    /// Placeholder for a file that has not been observed yet, by the path
    /// string the builder declared.
    PendingPath(String),
    /// Placeholder for a source known only by UUID.
    PendingUuid(Uuid),
}

impl DependencyTarget {
    pub fn is_placeholder(&self) -> bool {
        !matches!(self, DependencyTarget::Resolved(_))
    }

    pub fn resolved_name(&self) -> Option<&str> {
        match self {
            DependencyTarget::Resolved(name) => Some(name),
            _ => None,
        }
    }

    /// Index key; case-insensitive for paths.
    pub(crate) fn index_key(&self) -> String {
        match self {
            DependencyTarget::Resolved(name) => format!("name:{}", name_key(name)),
            DependencyTarget::PendingPath(path) => format!("path:{}", name_key(path)),
            DependencyTarget::PendingUuid(uuid) => format!("uuid:{}", uuid.hyphenated()),
        }
    }
}

impl fmt::Display for DependencyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyTarget::Resolved(name) => f.write_str(name),
            DependencyTarget::PendingPath(path) => write!(f, "<pending {}>", path),
            DependencyTarget::PendingUuid(uuid) => write!(f, "<pending {}>", uuid.hyphenated()),
        }
    }
}

/// `source` depends on `target`, as declared by the builder `builder_guid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileDependencyEntry {
    /// Zero until stored.
    pub id: DependencyId,
    pub builder_guid: Uuid,
    /// Database name of the declaring source.
    pub source: String,
    pub target: DependencyTarget,
    pub dependency_type: DependencyType,
}

impl SourceFileDependencyEntry {
    pub fn new(
        builder_guid: Uuid,
        source: impl Into<String>,
        target: DependencyTarget,
        dependency_type: DependencyType,
    ) -> Self {
        Self {
            id: 0,
            builder_guid,
            source: source.into(),
            target,
            dependency_type,
        }
    }

    /// Same edge ignoring the id and the case of paths.
    pub fn same_edge(&self, other: &SourceFileDependencyEntry) -> bool {
        self.builder_guid == other.builder_guid
            && self.dependency_type == other.dependency_type
            && name_key(&self.source) == name_key(&other.source)
            && self.target.index_key() == other.target.index_key()
    }
}
