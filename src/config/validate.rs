// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{PipelineError, Result};
use crate::registry::PatternMatcher;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::PipelineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_not_empty(cfg)?;
    validate_jobs(cfg)?;
    validate_scan_folders(cfg)?;
    validate_recognizers(cfg)?;
    validate_excludes(cfg)?;
    validate_builders(cfg)?;
    Ok(())
}

fn ensure_not_empty(cfg: &RawConfigFile) -> Result<()> {
    if cfg.platforms.enabled.is_empty() {
        return Err(PipelineError::ConfigError(
            "no platforms are enabled; set [platforms].enabled".to_string(),
        ));
    }
    if cfg.recognizers.is_empty() {
        return Err(PipelineError::ConfigError(
            "config must contain at least one [recognizer.<name>] section".to_string(),
        ));
    }
    if cfg.scan_folders.is_empty() {
        return Err(PipelineError::ConfigError(
            "config must contain at least one [[scan_folder]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_jobs(cfg: &RawConfigFile) -> Result<()> {
    if cfg.jobs.max == 0 {
        return Err(PipelineError::ConfigError(
            "[jobs].max must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.jobs.min > cfg.jobs.max {
        return Err(PipelineError::ConfigError(format!(
            "[jobs].min ({}) must not exceed [jobs].max ({})",
            cfg.jobs.min, cfg.jobs.max
        )));
    }
    Ok(())
}

fn validate_scan_folders(cfg: &RawConfigFile) -> Result<()> {
    let enabled: HashSet<&str> = cfg.platforms.enabled.iter().map(String::as_str).collect();
    let mut keys = HashSet::new();

    for folder in cfg.scan_folders.iter() {
        let key = folder
            .portable_key
            .clone()
            .or_else(|| folder.display_name.clone())
            .unwrap_or_else(|| folder.path.to_string_lossy().into_owned());
        if !keys.insert(key.to_lowercase()) {
            return Err(PipelineError::ConfigError(format!(
                "scan folder portable key '{}' is used more than once",
                key
            )));
        }
        for platform in folder.platforms.iter() {
            if !enabled.contains(platform.as_str()) {
                return Err(PipelineError::ConfigError(format!(
                    "scan folder '{}' lists platform '{}' which is not enabled",
                    key, platform
                )));
            }
        }
    }
    Ok(())
}

fn validate_recognizers(cfg: &RawConfigFile) -> Result<()> {
    let enabled: HashSet<&str> = cfg.platforms.enabled.iter().map(String::as_str).collect();

    for (name, rec) in cfg.recognizers.iter() {
        PatternMatcher::new(&rec.pattern, rec.pattern_type).map_err(|e| {
            PipelineError::ConfigError(format!("recognizer '{}': {}", name, e))
        })?;

        if !cfg.builders.contains_key(&rec.builder) {
            return Err(PipelineError::ConfigError(format!(
                "recognizer '{}' references unknown builder '{}'",
                name, rec.builder
            )));
        }

        if rec.platforms.is_empty() {
            return Err(PipelineError::ConfigError(format!(
                "recognizer '{}' does not build for any platform",
                name
            )));
        }

        for platform in rec.platforms.keys() {
            if !enabled.contains(platform.as_str()) {
                return Err(PipelineError::ConfigError(format!(
                    "recognizer '{}' lists platform '{}' which is not enabled",
                    name, platform
                )));
            }
        }
    }
    Ok(())
}

fn validate_excludes(cfg: &RawConfigFile) -> Result<()> {
    for (name, exclude) in cfg.excludes.iter() {
        PatternMatcher::new(&exclude.pattern, exclude.pattern_type).map_err(|e| {
            PipelineError::ConfigError(format!("exclude '{}': {}", name, e))
        })?;
    }
    Ok(())
}

fn validate_builders(cfg: &RawConfigFile) -> Result<()> {
    for (name, builder) in cfg.builders.iter() {
        if builder.auto_fail && builder.auto_succeed {
            return Err(PipelineError::ConfigError(format!(
                "builder '{}' cannot set both auto_fail and auto_succeed",
                name
            )));
        }
    }
    Ok(())
}
