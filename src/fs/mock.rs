// src/fs/mock.rs

//! In-memory [`FileSystem`] used by tests.
//!
//! Beyond plain files and directories, the mock can simulate a writer holding
//! a file open ([`MockFileSystem::set_locked`]), a volume that rejects writes
//! ([`MockFileSystem::deny_writes_under`]) and a move that cannot be done as a
//! rename ([`MockFileSystem::fail_renames`]).

use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, bail, Result};

use super::FileSystem;

#[derive(Debug, Clone)]
pub enum MockEntry {
    File { content: Vec<u8>, modified: SystemTime },
    Dir,
}

#[derive(Debug, Default)]
struct MockState {
    entries: BTreeMap<PathBuf, MockEntry>,
    locked: HashSet<PathBuf>,
    read_only: Vec<PathBuf>,
    fail_renames: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add (or overwrite) a file. Parent directories are created implicitly.
    ///
    /// The modification time is backdated so that freshly added files are not
    /// considered "still being written" by job pre-flight checks.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let modified = SystemTime::now() - Duration::from_secs(3600);
        self.add_file_with_mtime(path, content, modified);
    }

    pub fn add_file_with_mtime(
        &self,
        path: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
        modified: SystemTime,
    ) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.state();
        if let Some(parent) = path.parent() {
            ensure_dirs(&mut state.entries, parent);
        }
        state.entries.insert(
            path,
            MockEntry::File {
                content: content.into(),
                modified,
            },
        );
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut state = self.state();
        ensure_dirs(&mut state.entries, path.as_ref());
    }

    /// Remove a file or a whole directory tree, ignoring missing paths.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut state = self.state();
        state.entries.retain(|p, _| !p.starts_with(path));
    }

    /// Simulate another process holding `path` open for writing.
    pub fn set_locked(&self, path: impl AsRef<Path>, locked: bool) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.state();
        if locked {
            state.locked.insert(path);
        } else {
            state.locked.remove(&path);
        }
    }

    /// Reject every write, copy or rename whose destination is under `prefix`.
    pub fn deny_writes_under(&self, prefix: impl AsRef<Path>) {
        self.state().read_only.push(prefix.as_ref().to_path_buf());
    }

    /// Make every `rename` fail, forcing callers onto their copy fallback.
    pub fn fail_renames(&self, fail: bool) {
        self.state().fail_renames = fail;
    }

    /// All file paths currently present, sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        self.state()
            .entries
            .iter()
            .filter(|(_, e)| matches!(e, MockEntry::File { .. }))
            .map(|(p, _)| p.clone())
            .collect()
    }
}

fn ensure_dirs(entries: &mut BTreeMap<PathBuf, MockEntry>, path: &Path) {
    for ancestor in path.ancestors() {
        if ancestor.as_os_str().is_empty() {
            continue;
        }
        entries
            .entry(ancestor.to_path_buf())
            .or_insert(MockEntry::Dir);
    }
}

fn check_writable(state: &MockState, path: &Path) -> Result<()> {
    if state.read_only.iter().any(|p| path.starts_with(p)) {
        bail!("no space left on device: {:?}", path);
    }
    Ok(())
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let state = self.state();
        match state.entries.get(path) {
            Some(MockEntry::File { content, .. }) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let state = self.state();
        match state.entries.get(path) {
            Some(MockEntry::File { content, .. }) => Ok(Box::new(Cursor::new(content.clone()))),
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        check_writable(&self.state(), path)?;
        self.add_file_with_mtime(path, contents, SystemTime::now());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.state().entries.contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.state().entries.get(path), Some(MockEntry::File { .. }))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.state().entries.get(path), Some(MockEntry::Dir))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        // Tests use absolute paths throughout.
        Ok(path.to_path_buf())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let state = self.state();
        match state.entries.get(path) {
            Some(MockEntry::Dir) => Ok(state
                .entries
                .keys()
                .filter(|p| p.parent() == Some(path))
                .cloned()
                .collect()),
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        match self.state().entries.get(path) {
            Some(MockEntry::File { modified, .. }) => Ok(*modified),
            Some(MockEntry::Dir) => Ok(SystemTime::UNIX_EPOCH),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        check_writable(&state, path)?;
        ensure_dirs(&mut state.entries, path);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        match state.entries.get(path) {
            Some(MockEntry::File { .. }) => {
                state.entries.remove(path);
                Ok(())
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        if !matches!(state.entries.get(path), Some(MockEntry::Dir)) {
            bail!("Not a directory or not found: {:?}", path);
        }
        if state.entries.keys().any(|p| p.parent() == Some(path)) {
            bail!("Directory not empty: {:?}", path);
        }
        state.entries.remove(path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        if !state.entries.contains_key(path) {
            bail!("Not found: {:?}", path);
        }
        state.entries.retain(|p, _| !p.starts_with(path));
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut state = self.state();
        if state.fail_renames {
            bail!("cross-device link: {:?} -> {:?}", from, to);
        }
        check_writable(&state, to)?;
        let entry = state
            .entries
            .remove(from)
            .ok_or_else(|| anyhow!("File not found: {:?}", from))?;
        if let Some(parent) = to.parent() {
            ensure_dirs(&mut state.entries, parent);
        }
        state.entries.insert(to.to_path_buf(), entry);
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let mut state = self.state();
        check_writable(&state, to)?;
        let entry = match state.entries.get(from) {
            Some(entry @ MockEntry::File { .. }) => entry.clone(),
            _ => bail!("File not found: {:?}", from),
        };
        if let Some(parent) = to.parent() {
            ensure_dirs(&mut state.entries, parent);
        }
        state.entries.insert(to.to_path_buf(), entry);
        Ok(())
    }

    fn can_open_exclusive(&self, path: &Path) -> bool {
        let state = self.state();
        state.entries.contains_key(path) && !state.locked.contains(path)
    }
}
