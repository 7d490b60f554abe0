#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use assetpipe::config::{
    BuilderConfig, CacheSection, ConfigFile, ExcludeConfig, MetadataConfig, RawConfigFile,
    RecognizerConfig, RecognizerPlatformConfig, ScanFolderConfig,
};
use assetpipe::errors::Result;
use assetpipe::types::PatternType;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    /// Empty configuration whose cache lives at `cache_root`.
    pub fn new(cache_root: impl AsRef<Path>) -> Self {
        Self {
            config: RawConfigFile {
                cache: CacheSection {
                    root: cache_root.as_ref().to_path_buf(),
                    ..CacheSection::default()
                },
                ..RawConfigFile::default()
            },
        }
    }

    pub fn with_game(mut self, game: &str) -> Self {
        self.config.cache.game = game.to_string();
        self
    }

    pub fn with_database(mut self, file: &str) -> Self {
        self.config.cache.database = Some(PathBuf::from(file));
        self
    }

    pub fn with_platforms(mut self, platforms: &[&str]) -> Self {
        self.config.platforms.enabled = platforms.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_jobs(mut self, min: usize, max: usize) -> Self {
        self.config.jobs.min = min;
        self.config.jobs.max = max;
        self
    }

    pub fn with_scan_folder(mut self, folder: ScanFolderConfig) -> Self {
        self.config.scan_folders.push(folder);
        self
    }

    /// Shorthand for a recursive, non-root scan folder.
    pub fn scan_folder(self, path: impl AsRef<Path>, portable_key: &str, order: i32) -> Self {
        self.with_scan_folder(ScanFolderBuilder::new(path, portable_key).order(order).build())
    }

    /// Adds the recognizer and, if missing, a placeholder `[builder.<name>]`
    /// section so validation passes.
    pub fn with_recognizer(mut self, name: &str, recognizer: RecognizerConfig) -> Self {
        self.config
            .builders
            .entry(recognizer.builder.clone())
            .or_insert_with(|| builder_config("true"));
        self.config.recognizers.insert(name.to_string(), recognizer);
        self
    }

    pub fn with_builder(mut self, name: &str, cmd: &str) -> Self {
        self.config.builders.insert(name.to_string(), builder_config(cmd));
        self
    }

    pub fn with_exclude(mut self, name: &str, pattern: &str) -> Self {
        self.config.excludes.insert(
            name.to_string(),
            ExcludeConfig {
                pattern: pattern.to_string(),
                pattern_type: PatternType::Wildcard,
            },
        );
        self
    }

    pub fn with_metadata(mut self, extension: &str, original_extension: &str) -> Self {
        self.config.metadata.push(MetadataConfig {
            extension: extension.to_string(),
            original_extension: original_extension.to_string(),
        });
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

fn builder_config(cmd: &str) -> BuilderConfig {
    BuilderConfig {
        cmd: cmd.to_string(),
        job_key: "Compile".to_string(),
        version: String::new(),
        fingerprint: String::new(),
        auto_fail: false,
        auto_succeed: false,
    }
}

/// Builder for `ScanFolderConfig`.
pub struct ScanFolderBuilder {
    folder: ScanFolderConfig,
}

impl ScanFolderBuilder {
    pub fn new(path: impl AsRef<Path>, portable_key: &str) -> Self {
        Self {
            folder: ScanFolderConfig {
                path: path.as_ref().to_path_buf(),
                display_name: None,
                portable_key: Some(portable_key.to_string()),
                output_prefix: String::new(),
                root: false,
                recurse: true,
                order: 0,
                platforms: Vec::new(),
            },
        }
    }

    pub fn order(mut self, order: i32) -> Self {
        self.folder.order = order;
        self
    }

    pub fn root(mut self, root: bool) -> Self {
        self.folder.root = root;
        self
    }

    pub fn recurse(mut self, recurse: bool) -> Self {
        self.folder.recurse = recurse;
        self
    }

    pub fn output_prefix(mut self, prefix: &str) -> Self {
        self.folder.output_prefix = prefix.to_string();
        self
    }

    pub fn platform(mut self, platform: &str) -> Self {
        self.folder.platforms.push(platform.to_string());
        self
    }

    pub fn build(self) -> ScanFolderConfig {
        self.folder
    }
}

/// Builder for `RecognizerConfig`.
pub struct RecognizerBuilder {
    recognizer: RecognizerConfig,
}

impl RecognizerBuilder {
    pub fn new(pattern: &str, builder: &str) -> Self {
        Self {
            recognizer: RecognizerConfig {
                pattern: pattern.to_string(),
                pattern_type: PatternType::Wildcard,
                builder: builder.to_string(),
                version: String::new(),
                priority: 0,
                critical: false,
                exclusive_lock: false,
                platforms: BTreeMap::new(),
            },
        }
    }

    pub fn regex(mut self) -> Self {
        self.recognizer.pattern_type = PatternType::Regex;
        self
    }

    pub fn platform(mut self, platform: &str, params: &str) -> Self {
        self.recognizer.platforms.insert(
            platform.to_string(),
            RecognizerPlatformConfig {
                params: params.to_string(),
            },
        );
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.recognizer.priority = priority;
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.recognizer.critical = critical;
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.recognizer.version = version.to_string();
        self
    }

    pub fn build(self) -> RecognizerConfig {
        self.recognizer
    }
}
