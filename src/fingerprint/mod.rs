// src/fingerprint/mod.rs

//! Job fingerprints.
//!
//! A fingerprint summarizes everything that must force a job to run again:
//! the builder identity and version, the recognizer parameters for the
//! platform, the job's own extra info, the content of the source and the
//! content of every file in its fingerprint set (sidecars plus the dependency
//! closure). File content is hashed with blake3.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;

use crate::builder::BuilderDescriptor;
use crate::fs::FileSystem;
use crate::path_utils::normalize_path;
use crate::registry::AssetRecognizer;

pub mod cache;

pub use cache::FileCache;

/// Stored for jobs that must run again regardless of content, and returned
/// when the source itself cannot be read.
pub const FAILED_FINGERPRINT: u64 = 0;

/// Inputs of one fingerprint computation.
#[derive(Debug, Clone)]
pub struct FingerprintSpec<'a> {
    pub source: &'a Path,
    pub extra_info: &'a str,
    /// Other files whose content participates; missing ones are skipped.
    pub fingerprint_files: &'a [PathBuf],
}

/// Compute a job fingerprint. `stamp` returns the content hash of a file, or
/// `None` if it does not exist.
///
/// Never returns [`FAILED_FINGERPRINT`] for a readable source.
pub fn compute_fingerprint<F>(spec: &FingerprintSpec<'_>, mut stamp: F) -> u64
where
    F: FnMut(&Path) -> Option<String>,
{
    let Some(source_stamp) = stamp(spec.source) else {
        return FAILED_FINGERPRINT;
    };

    let mut hasher = Hasher::new();
    hasher.update(spec.extra_info.as_bytes());
    hasher.update(&[0]);
    hasher.update(source_stamp.as_bytes());
    hasher.update(&[0]);

    for file in spec.fingerprint_files {
        if let Some(file_stamp) = stamp(file) {
            hasher.update(normalize_path(file).to_lowercase().as_bytes());
            hasher.update(&[0]);
            hasher.update(file_stamp.as_bytes());
            hasher.update(&[0]);
        }
    }

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
    match u64::from_le_bytes(bytes) {
        FAILED_FINGERPRINT => 1,
        value => value,
    }
}

/// Fingerprint-relevant text of a job: builder identity and version, every
/// matching recognizer's parameters for `platform` in priority order, the job
/// key and the job's additional info.
pub fn extra_info(
    builder: &BuilderDescriptor,
    recognizers: &[&AssetRecognizer],
    platform: &str,
    job_key: &str,
    additional: &str,
) -> String {
    let mut info = format!("{}|{}|{}", builder.bus_id.hyphenated(), builder.version, platform);
    for recognizer in recognizers {
        if let Some(params) = recognizer.platform_params.get(platform) {
            info.push('|');
            info.push_str(&recognizer.name);
            info.push(':');
            info.push_str(&recognizer.version);
            info.push(':');
            info.push_str(params);
        }
    }
    info.push('|');
    info.push_str(job_key);
    info.push('|');
    info.push_str(additional);
    info
}

/// Hex blake3 hash of a file's content.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Hash over a list of stamps, in order.
pub fn compute_aggregate_hash(stamps: &[String]) -> String {
    let mut hasher = Hasher::new();
    for stamp in stamps {
        hasher.update(stamp.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}
