// src/registry/recognizers.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{ConfigFile, MetadataConfig, RecognizerConfig};
use crate::errors::Result;
use crate::path_utils::eq_ignore_case;
use crate::registry::patterns::PatternMatcher;
use crate::types::PatternType;

/// Maps a file pattern to a builder, with per-platform parameters.
#[derive(Debug, Clone)]
pub struct AssetRecognizer {
    pub name: String,
    pub matcher: PatternMatcher,
    /// Name of the builder that handles matching files.
    pub builder: String,
    /// Platform id -> extra builder parameters (fingerprint relevant).
    pub platform_params: BTreeMap<String, String>,
    pub version: String,
    pub priority: i32,
    pub critical: bool,
    pub exclusive_lock: bool,
}

impl AssetRecognizer {
    pub fn new(name: &str, pattern: &str, pattern_type: PatternType, builder: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            matcher: PatternMatcher::new(pattern, pattern_type)?,
            builder: builder.to_string(),
            platform_params: BTreeMap::new(),
            version: String::new(),
            priority: 0,
            critical: false,
            exclusive_lock: false,
        })
    }

    pub fn from_config(name: &str, cfg: &RecognizerConfig) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            matcher: PatternMatcher::new(&cfg.pattern, cfg.pattern_type)?,
            builder: cfg.builder.clone(),
            platform_params: cfg
                .platforms
                .iter()
                .map(|(platform, p)| (platform.clone(), p.params.clone()))
                .collect(),
            version: cfg.version.clone(),
            priority: cfg.priority,
            critical: cfg.critical,
            exclusive_lock: cfg.exclusive_lock,
        })
    }

    pub fn with_platform(mut self, platform: &str, params: &str) -> Self {
        self.platform_params
            .insert(platform.to_string(), params.to_string());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn builds_for(&self, platform: &str) -> bool {
        self.platform_params.contains_key(platform)
    }
}

/// A sidecar file type whose changes are attributed to the source it sits
/// next to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataType {
    pub extension: String,
    pub original_extension: String,
}

impl From<&MetadataConfig> for MetadataType {
    fn from(cfg: &MetadataConfig) -> Self {
        Self {
            extension: cfg.extension.trim_start_matches('.').to_string(),
            original_extension: cfg.original_extension.trim_start_matches('.').to_string(),
        }
    }
}

/// Recognizers, excludes and sidecar types.
#[derive(Debug, Clone, Default)]
pub struct RecognizerRegistry {
    /// Sorted by descending priority, then name.
    recognizers: Vec<AssetRecognizer>,
    excludes: Vec<(String, PatternMatcher)>,
    metadata: Vec<MetadataType>,
}

impl RecognizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let mut registry = Self::new();
        for (name, rec) in cfg.recognizers.iter() {
            registry.add_recognizer(AssetRecognizer::from_config(name, rec)?);
        }
        for (name, exclude) in cfg.excludes.iter() {
            registry.add_exclude(name, PatternMatcher::new(&exclude.pattern, exclude.pattern_type)?);
        }
        for meta in cfg.metadata.iter() {
            registry.add_metadata_type(MetadataType::from(meta));
        }
        Ok(registry)
    }

    /// Add a recognizer, replacing any existing one with the same name.
    pub fn add_recognizer(&mut self, recognizer: AssetRecognizer) {
        self.recognizers.retain(|r| r.name != recognizer.name);
        self.recognizers.push(recognizer);
        self.recognizers
            .sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
    }

    pub fn add_exclude(&mut self, name: &str, matcher: PatternMatcher) {
        self.excludes.retain(|(n, _)| n != name);
        self.excludes.push((name.to_string(), matcher));
    }

    pub fn add_metadata_type(&mut self, metadata: MetadataType) {
        if !self.metadata.contains(&metadata) {
            self.metadata.push(metadata);
        }
    }

    pub fn recognizers(&self) -> &[AssetRecognizer] {
        &self.recognizers
    }

    pub fn is_excluded(&self, rel_path: &str) -> bool {
        self.excludes.iter().any(|(_, m)| m.matches(rel_path))
    }

    /// Recognizers matching `rel_path`, highest priority first. Excluded
    /// paths match nothing.
    pub fn matching_recognizers(&self, rel_path: &str) -> Vec<&AssetRecognizer> {
        if self.is_excluded(rel_path) {
            return Vec::new();
        }
        self.recognizers
            .iter()
            .filter(|r| r.matcher.matches(rel_path))
            .collect()
    }

    /// Sidecar files that belong to `source`, existing or not.
    pub fn sidecars_for(&self, source: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for meta in self.metadata.iter() {
            if meta.original_extension.is_empty() {
                let mut name = source.as_os_str().to_owned();
                name.push(".");
                name.push(&meta.extension);
                out.push(PathBuf::from(name));
            } else if source
                .extension()
                .map(|e| eq_ignore_case(&e.to_string_lossy(), &meta.original_extension))
                .unwrap_or(false)
            {
                out.push(source.with_extension(&meta.extension));
            }
        }
        out
    }

    /// If `path` is a sidecar file, the source path it describes.
    pub fn source_for_sidecar(&self, path: &Path) -> Option<PathBuf> {
        let ext = path.extension()?.to_string_lossy().into_owned();
        let meta = self
            .metadata
            .iter()
            .find(|m| eq_ignore_case(&m.extension, &ext))?;
        if meta.original_extension.is_empty() {
            Some(path.with_extension(""))
        } else {
            Some(path.with_extension(&meta.original_extension))
        }
    }
}
