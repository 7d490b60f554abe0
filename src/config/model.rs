// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::PatternType;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [cache]
/// root = "Cache"
/// game = "samplegame"
///
/// [platforms]
/// enabled = ["pc", "es3"]
///
/// [[scan_folder]]
/// path = "Game"
/// portable_key = "game"
///
/// [recognizer.textures]
/// pattern = "*.png"
/// builder = "texture"
/// platforms = { pc = { params = "--fast" } }
///
/// [builder.texture]
/// cmd = "texconv $ASSETPIPE_SOURCE $ASSETPIPE_TEMP_DIR"
/// ```
///
/// This is the unvalidated form; see [`ConfigFile`] for the checked one.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub jobs: JobsSection,

    #[serde(default)]
    pub platforms: PlatformsSection,

    /// `[[scan_folder]]` entries, in file order.
    #[serde(default, rename = "scan_folder")]
    pub scan_folders: Vec<ScanFolderConfig>,

    /// `[recognizer.<name>]` sections.
    #[serde(default, rename = "recognizer")]
    pub recognizers: BTreeMap<String, RecognizerConfig>,

    /// `[exclude.<name>]` sections.
    #[serde(default, rename = "exclude")]
    pub excludes: BTreeMap<String, ExcludeConfig>,

    /// `[[metadata]]` sidecar file types.
    #[serde(default)]
    pub metadata: Vec<MetadataConfig>,

    /// `[builder.<name>]` external command builders.
    #[serde(default, rename = "builder")]
    pub builders: BTreeMap<String, BuilderConfig>,
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (see `validate.rs`), so
/// holders can rely on every pattern compiling and every cross reference
/// resolving.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub cache: CacheSection,
    pub jobs: JobsSection,
    pub platforms: PlatformsSection,
    pub scan_folders: Vec<ScanFolderConfig>,
    pub recognizers: BTreeMap<String, RecognizerConfig>,
    pub excludes: BTreeMap<String, ExcludeConfig>,
    pub metadata: Vec<MetadataConfig>,
    pub builders: BTreeMap<String, BuilderConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            cache: raw.cache,
            jobs: raw.jobs,
            platforms: raw.platforms,
            scan_folders: raw.scan_folders,
            recognizers: raw.recognizers,
            excludes: raw.excludes,
            metadata: raw.metadata,
            builders: raw.builders,
        }
    }

    /// Enabled platform identifiers, in declaration order.
    pub fn enabled_platforms(&self) -> &[String] {
        &self.platforms.enabled
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Root of the product cache. Relative paths are resolved against the
    /// directory containing the config file.
    #[serde(default = "default_cache_root")]
    pub root: PathBuf,

    /// Game (project) name inserted below the platform folder for scan
    /// folders that are not marked `root = true`.
    #[serde(default = "default_game")]
    pub game: String,

    /// Database file, relative to the cache root. `None` keeps all state in
    /// memory for the lifetime of the process.
    #[serde(default)]
    pub database: Option<PathBuf>,
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("Cache")
}

fn default_game() -> String {
    "game".to_string()
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
            game: default_game(),
            database: None,
        }
    }
}

/// `[jobs]` section: worker concurrency and pre-flight timing.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsSection {
    #[serde(default = "default_min_jobs")]
    pub min: usize,

    #[serde(default = "default_max_jobs")]
    pub max: usize,

    /// Files modified more recently than this are left alone until they age.
    #[serde(default = "default_grace_window_ms")]
    pub grace_window_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub lock_timeout_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub settle_timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_min_jobs() -> usize {
    1
}

fn default_max_jobs() -> usize {
    4
}

fn default_grace_window_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            min: default_min_jobs(),
            max: default_max_jobs(),
            grace_window_ms: default_grace_window_ms(),
            lock_timeout_ms: default_timeout_ms(),
            settle_timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// `[platforms]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PlatformsSection {
    #[serde(default)]
    pub enabled: Vec<String>,
}

/// One `[[scan_folder]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanFolderConfig {
    pub path: PathBuf,

    #[serde(default)]
    pub display_name: Option<String>,

    /// Stable identity of this folder. Defaults to the display name.
    #[serde(default)]
    pub portable_key: Option<String>,

    /// Namespace prepended to database names of files in this folder.
    #[serde(default)]
    pub output_prefix: String,

    /// Root folders put products directly under the platform folder instead
    /// of under the game folder.
    #[serde(default)]
    pub root: bool,

    #[serde(default = "default_true")]
    pub recurse: bool,

    /// Override priority; lower wins.
    #[serde(default)]
    pub order: i32,

    /// Platforms this folder builds for. Empty means all enabled platforms.
    #[serde(default)]
    pub platforms: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Per-platform recognizer parameters.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct RecognizerPlatformConfig {
    /// Extra builder parameters; part of the job fingerprint.
    #[serde(default)]
    pub params: String,
}

/// `[recognizer.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RecognizerConfig {
    pub pattern: String,

    #[serde(default)]
    pub pattern_type: PatternType,

    /// Name of the `[builder.<name>]` that handles matching files.
    pub builder: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub critical: bool,

    /// Wait until the source can be opened exclusively before processing.
    #[serde(default)]
    pub exclusive_lock: bool,

    /// Platform id -> parameters. Platforms absent here are not built.
    #[serde(default)]
    pub platforms: BTreeMap<String, RecognizerPlatformConfig>,
}

/// `[exclude.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExcludeConfig {
    pub pattern: String,

    #[serde(default)]
    pub pattern_type: PatternType,
}

/// `[[metadata]]` sidecar type.
///
/// With `original_extension` empty the sidecar is the full source name plus
/// `.extension` (`rock.png.assetinfo`); otherwise it replaces the source
/// extension (`rock.assetinfo` for `rock.png`).
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    pub extension: String,

    #[serde(default)]
    pub original_extension: String,
}

/// `[builder.<name>]` section: an external command run once per job.
#[derive(Debug, Clone, Deserialize)]
pub struct BuilderConfig {
    pub cmd: String,

    #[serde(default = "default_job_key")]
    pub job_key: String,

    #[serde(default)]
    pub version: String,

    /// Analysis fingerprint; bump to force reanalysis of every matching file.
    #[serde(default)]
    pub fingerprint: String,

    /// Report every job as failed without running `cmd`.
    #[serde(default)]
    pub auto_fail: bool,

    /// Report every job as done without running `cmd` or storing a result.
    #[serde(default)]
    pub auto_succeed: bool,
}

fn default_job_key() -> String {
    "Compile".to_string()
}
