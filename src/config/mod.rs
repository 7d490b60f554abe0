// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it once at startup (`validate.rs`); an invalid configuration is
//!   fatal.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{config_root_dir, load_and_validate, load_from_path};
pub use model::{
    BuilderConfig, CacheSection, ConfigFile, ExcludeConfig, JobsSection, MetadataConfig,
    PlatformsSection, RawConfigFile, RecognizerConfig, RecognizerPlatformConfig,
    ScanFolderConfig,
};
