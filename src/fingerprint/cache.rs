// src/fingerprint/cache.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Result;
use tracing::debug;

use crate::fingerprint::compute_file_hash;
use crate::fs::FileSystem;

/// In-memory cache of file content hashes.
///
/// An entry is reused only while the file's modification time is unchanged;
/// file events additionally invalidate entries explicitly.
#[derive(Debug, Default)]
pub struct FileCache {
    hashes: HashMap<PathBuf, (SystemTime, String)>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash of the file at `path`, computing and caching it if necessary.
    pub fn get_or_compute(&mut self, fs: &dyn FileSystem, path: &Path) -> Result<String> {
        let modified = fs.modified(path)?;
        if let Some((cached_at, hash)) = self.hashes.get(path) {
            if *cached_at == modified {
                return Ok(hash.clone());
            }
        }

        debug!("cache miss: computing hash for {:?}", path);
        let hash = compute_file_hash(fs, path)?;
        self.hashes
            .insert(path.to_path_buf(), (modified, hash.clone()));
        Ok(hash)
    }

    /// Like [`get_or_compute`](Self::get_or_compute) but `None` for missing
    /// or unreadable files.
    pub fn stamp(&mut self, fs: &dyn FileSystem, path: &Path) -> Option<String> {
        if !fs.is_file(path) {
            self.invalidate(path);
            return None;
        }
        self.get_or_compute(fs, path).ok()
    }

    pub fn invalidate(&mut self, path: &Path) {
        if self.hashes.remove(path).is_some() {
            debug!("invalidated cache for {:?}", path);
        }
    }

    /// Drop every entry below `dir`.
    pub fn invalidate_under(&mut self, dir: &Path) {
        self.hashes.retain(|p, _| !p.starts_with(dir));
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}
