// src/registry/mod.rs

//! Lookup structures built once from configuration:
//! - scan folders and path resolution ([`scan_folders`]),
//! - recognizers, excludes and sidecar types ([`recognizers`]),
//! - registered builders and their dirtiness ([`builders`]).

pub mod builders;
pub mod patterns;
pub mod recognizers;
pub mod scan_folders;

pub use builders::{BuilderDirtiness, BuilderRegistry};
pub use patterns::PatternMatcher;
pub use recognizers::{AssetRecognizer, MetadataType, RecognizerRegistry};
pub use scan_folders::{update_to_correct_case, RelativePath, ScanFolderInfo, ScanFolderRegistry};

use crate::config::ConfigFile;
use crate::errors::Result;

/// Scan folders, recognizers and the enabled platform list, as consumed by
/// the conductor.
#[derive(Debug, Clone, Default)]
pub struct ScanRegistry {
    pub scan_folders: ScanFolderRegistry,
    pub recognizers: RecognizerRegistry,
    pub platforms: Vec<String>,
}

impl ScanRegistry {
    pub fn new(
        scan_folders: ScanFolderRegistry,
        recognizers: RecognizerRegistry,
        platforms: Vec<String>,
    ) -> Self {
        Self {
            scan_folders,
            recognizers,
            platforms,
        }
    }

    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Ok(Self {
            scan_folders: ScanFolderRegistry::from_config(cfg),
            recognizers: RecognizerRegistry::from_config(cfg)?,
            platforms: cfg.enabled_platforms().to_vec(),
        })
    }
}
