// src/types.rs

//! Small shared enums used by config, the dependency store and builders.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of a source file dependency edge.
///
/// `Any` is only meaningful as a query filter; stored edges are always one of
/// the two concrete kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    SourceToSource,
    JobToJob,
    Any,
}

impl DependencyType {
    /// Whether an edge of kind `self` is selected by the query filter `filter`.
    pub fn selected_by(self, filter: DependencyType) -> bool {
        filter == DependencyType::Any || self == filter
    }
}

impl Default for DependencyType {
    fn default() -> Self {
        DependencyType::SourceToSource
    }
}

impl FromStr for DependencyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "source_to_source" | "source" => Ok(DependencyType::SourceToSource),
            "job_to_job" | "job" => Ok(DependencyType::JobToJob),
            "any" => Ok(DependencyType::Any),
            other => Err(format!(
                "invalid dependency type: {other} (expected \"source_to_source\", \"job_to_job\" or \"any\")"
            )),
        }
    }
}

/// How a recognizer or builder pattern string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    /// Shell-style wildcard, matched case-insensitively.
    Wildcard,
    /// Regular expression matched against the scan-folder-relative path.
    Regex,
}

impl Default for PatternType {
    fn default() -> Self {
        PatternType::Wildcard
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternType::Wildcard => f.write_str("wildcard"),
            PatternType::Regex => f.write_str("regex"),
        }
    }
}
