// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Rejects configurations without platforms, scan folders or recognizers,
///   with duplicate portable keys, with patterns that do not compile, or with
///   recognizers routed to unknown builders.
///
/// Relative scan folder and cache paths are resolved against the directory
/// that contains the config file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let mut raw_config = load_from_path(path)?;

    let base = config_root_dir(path);
    for folder in raw_config.scan_folders.iter_mut() {
        if folder.path.is_relative() {
            folder.path = base.join(&folder.path);
        }
    }
    if raw_config.cache.root.is_relative() {
        raw_config.cache.root = base.join(&raw_config.cache.root);
    }

    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Directory the config file lives in; the current directory for a bare
/// file name.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
