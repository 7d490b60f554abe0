// src/engine/scan.rs

//! Walking scan folders.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::fs::FileSystem;
use crate::path_utils::{eq_ignore_case, normalize_path};
use crate::registry::ScanFolderInfo;

/// Every file below the given scan folders, honoring `recurse` and never
/// descending into the cache root. Sorted and without duplicates.
pub fn collect_files(fs: &dyn FileSystem, folders: &[ScanFolderInfo], cache_root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for folder in folders {
        if !fs.is_dir(&folder.path) {
            warn!(folder = ?folder.path, "scan folder does not exist");
            continue;
        }
        files.extend(files_under(fs, &folder.path, folder.recurse, cache_root));
    }
    files.sort();
    files.dedup();
    files
}

/// Files below `dir`; only its direct children unless `recurse`.
pub fn files_under(fs: &dyn FileSystem, dir: &Path, recurse: bool, cache_root: &Path) -> Vec<PathBuf> {
    let cache = normalize_path(cache_root);
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let entries = match fs.read_dir(&current) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = ?current, error = %format!("{err:#}"), "cannot list directory");
                continue;
            }
        };
        for entry in entries {
            if fs.is_dir(&entry) {
                if recurse && !eq_ignore_case(&normalize_path(&entry), &cache) {
                    pending.push(entry);
                }
            } else if fs.is_file(&entry) {
                files.push(entry);
            }
        }
    }

    files.sort();
    files
}
