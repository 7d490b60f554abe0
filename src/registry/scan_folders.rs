// src/registry/scan_folders.rs

//! Ordered list of watched roots and the path resolution built on top of it:
//! which folder owns a file, what its database name is, and whether a
//! higher-priority folder overrides it.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{ConfigFile, ScanFolderConfig};
use crate::fs::FileSystem;
use crate::path_utils::{eq_ignore_case, normalize_path, strip_dir_prefix};

/// A watched root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFolderInfo {
    pub path: PathBuf,
    pub display_name: String,
    /// Identity that survives the folder being moved on disk.
    pub portable_key: String,
    /// Namespace prepended to the database name of every file in the folder.
    pub output_prefix: String,
    pub is_root: bool,
    pub recurse: bool,
    /// Override priority; lower wins.
    pub order: i32,
    pub platforms: Vec<String>,
}

impl ScanFolderInfo {
    pub fn new(path: impl Into<PathBuf>, portable_key: impl Into<String>, order: i32) -> Self {
        let portable_key = portable_key.into();
        Self {
            path: path.into(),
            display_name: portable_key.clone(),
            portable_key,
            output_prefix: String::new(),
            is_root: false,
            recurse: true,
            order,
            platforms: Vec::new(),
        }
    }

    pub fn from_config(cfg: &ScanFolderConfig, enabled_platforms: &[String]) -> Self {
        let display_name = cfg
            .display_name
            .clone()
            .unwrap_or_else(|| cfg.path.to_string_lossy().into_owned());
        let portable_key = cfg
            .portable_key
            .clone()
            .unwrap_or_else(|| display_name.clone());
        let platforms = if cfg.platforms.is_empty() {
            enabled_platforms.to_vec()
        } else {
            cfg.platforms.clone()
        };

        Self {
            path: cfg.path.clone(),
            display_name,
            portable_key,
            output_prefix: cfg.output_prefix.trim_matches('/').to_string(),
            is_root: cfg.root,
            recurse: cfg.recurse,
            order: cfg.order,
            platforms,
        }
    }

    pub fn with_output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_prefix = prefix.into();
        self
    }

    pub fn with_recurse(mut self, recurse: bool) -> Self {
        self.recurse = recurse;
        self
    }

    pub fn with_platforms(mut self, platforms: &[&str]) -> Self {
        self.platforms = platforms.iter().map(|p| p.to_string()).collect();
        self
    }

    fn normalized_path(&self) -> String {
        normalize_path(&self.path)
    }

    /// Strip this folder's output prefix from a database name, if present.
    fn strip_output_prefix<'a>(&self, database_name: &'a str) -> &'a str {
        if self.output_prefix.is_empty() {
            return database_name;
        }
        strip_dir_prefix(database_name, &self.output_prefix).unwrap_or(database_name)
    }
}

/// Result of resolving an absolute path against the scan folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativePath {
    /// Output-prefix-qualified name used as the database key.
    pub database_name: String,
    /// Path relative to the owning scan folder.
    pub relative_path: String,
    /// Root of the owning scan folder.
    pub scan_folder: PathBuf,
}

/// Scan folders sorted by priority (lowest `order` first).
#[derive(Debug, Clone, Default)]
pub struct ScanFolderRegistry {
    folders: Vec<ScanFolderInfo>,
}

impl ScanFolderRegistry {
    /// Build the registry. A later folder with the same portable key
    /// (case-insensitive) replaces an earlier one.
    pub fn new(folders: Vec<ScanFolderInfo>) -> Self {
        let mut registry = Self::default();
        for folder in folders {
            registry.add(folder);
        }
        registry
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(
            cfg.scan_folders
                .iter()
                .map(|f| ScanFolderInfo::from_config(f, cfg.enabled_platforms()))
                .collect(),
        )
    }

    pub fn add(&mut self, folder: ScanFolderInfo) {
        let key = folder.portable_key.to_lowercase();
        self.folders
            .retain(|f| f.portable_key.to_lowercase() != key);
        self.folders.push(folder);
        // Stable sort: equal orders keep insertion order.
        self.folders.sort_by_key(|f| f.order);
    }

    pub fn folders(&self) -> &[ScanFolderInfo] {
        &self.folders
    }

    pub fn by_portable_key(&self, key: &str) -> Option<&ScanFolderInfo> {
        self.folders
            .iter()
            .find(|f| eq_ignore_case(&f.portable_key, key))
    }

    pub fn by_path(&self, path: &Path) -> Option<&ScanFolderInfo> {
        let wanted = normalize_path(path);
        self.folders
            .iter()
            .find(|f| eq_ignore_case(&f.normalized_path(), &wanted))
    }

    /// Find the scan folder that owns `absolute_path`.
    ///
    /// An exact match on a folder root wins outright. Otherwise, among the
    /// folders containing the path, the lowest `order` wins, and on equal
    /// order a folder that directly contains the file beats one that only
    /// reaches it through recursion. Non-recursive folders only own their
    /// immediate children.
    pub fn scan_folder_for_file(&self, absolute_path: &Path) -> Option<&ScanFolderInfo> {
        let normalized = normalize_path(absolute_path);

        if let Some(exact) = self
            .folders
            .iter()
            .find(|f| eq_ignore_case(&f.normalized_path(), &normalized))
        {
            return Some(exact);
        }

        self.folders
            .iter()
            .filter_map(|folder| {
                let rel = strip_dir_prefix(&normalized, &folder.normalized_path())?;
                if rel.is_empty() {
                    return None;
                }
                let direct_child = !rel.contains('/');
                if !folder.recurse && !direct_child {
                    return None;
                }
                Some((folder, direct_child))
            })
            .min_by_key(|(folder, direct_child)| (folder.order, !*direct_child))
            .map(|(folder, _)| folder)
    }

    /// Resolve an absolute path into its database name and scan-folder
    /// relative path.
    pub fn convert_to_relative_path(&self, absolute_path: &Path) -> Option<RelativePath> {
        let folder = self.scan_folder_for_file(absolute_path)?;
        let normalized = normalize_path(absolute_path);
        let relative_path = strip_dir_prefix(&normalized, &folder.normalized_path())
            .unwrap_or_default()
            .to_string();

        let database_name = if folder.output_prefix.is_empty() {
            relative_path.clone()
        } else if relative_path.is_empty() {
            folder.output_prefix.clone()
        } else {
            format!("{}/{}", folder.output_prefix, relative_path)
        };

        Some(RelativePath {
            database_name,
            relative_path,
            scan_folder: folder.path.clone(),
        })
    }

    /// Absolute path of a database name inside the given scan folder.
    pub fn absolute_path_of(&self, folder: &ScanFolderInfo, database_name: &str) -> PathBuf {
        folder.path.join(folder.strip_output_prefix(database_name))
    }

    /// Return the file from a higher-priority scan folder that overrides
    /// `database_name` as seen from `from_scan_folder`.
    ///
    /// Returns `None` when `from_scan_folder` is already the winner or no
    /// other folder has the file. The search is case-insensitive; the result
    /// carries the real on-disk case.
    pub fn get_overriding_file(
        &self,
        fs: &dyn FileSystem,
        database_name: &str,
        from_scan_folder: &Path,
    ) -> Option<PathBuf> {
        let from = normalize_path(from_scan_folder);
        for folder in self.folders.iter() {
            if eq_ignore_case(&folder.normalized_path(), &from) {
                return None;
            }
            if let Some(found) = find_in_folder(fs, folder, database_name) {
                debug!(
                    file = %database_name,
                    winner = ?found,
                    "file is overridden by a higher-priority scan folder"
                );
                return Some(found);
            }
        }
        None
    }

    /// Search every scan folder in priority order for `database_name` and
    /// return the first hit with its on-disk case.
    pub fn find_first_matching_file(
        &self,
        fs: &dyn FileSystem,
        database_name: &str,
    ) -> Option<PathBuf> {
        if database_name.is_empty() {
            return None;
        }
        self.folders
            .iter()
            .find_map(|folder| find_in_folder(fs, folder, database_name))
    }
}

fn find_in_folder(fs: &dyn FileSystem, folder: &ScanFolderInfo, database_name: &str) -> Option<PathBuf> {
    let rel = folder.strip_output_prefix(database_name);
    if !folder.recurse && rel.contains('/') {
        return None;
    }
    update_to_correct_case(fs, &folder.path, rel)
}

/// Resolve `relative` below `root` component by component, matching each one
/// case-insensitively against the directory listing. Returns the path with
/// the on-disk case, or `None` if any component is missing.
pub fn update_to_correct_case(fs: &dyn FileSystem, root: &Path, relative: &str) -> Option<PathBuf> {
    let mut current = root.to_path_buf();
    for component in relative.split('/').filter(|c| !c.is_empty()) {
        // Always list: the result must carry the on-disk case.
        let entries = fs.read_dir(&current).ok()?;
        let name_of = |entry: &PathBuf| {
            entry
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        let exact = entries.iter().find(|e| name_of(e) == component);
        let found = exact.or_else(|| {
            entries
                .iter()
                .find(|e| eq_ignore_case(&name_of(e), component))
        })?;
        current = found.clone();
    }
    if current == root {
        return None;
    }
    Some(current)
}
