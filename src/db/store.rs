// src/db/store.rs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::db::AssetDatabase;
use crate::fs::FileSystem;

/// Abstract persistence for the asset database.
pub trait StateStore: Send + Sync {
    /// Load the last saved database; an empty one if nothing was saved yet.
    fn load(&self) -> Result<AssetDatabase>;
    fn save(&mut self, db: &AssetDatabase) -> Result<()>;
}

/// Stores the database as JSON in a single file.
///
/// Writes go to a sibling temp file first and are moved into place, so a
/// crash mid-write leaves the previous state intact.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<AssetDatabase> {
        if !self.fs.exists(&self.path) {
            debug!(path = ?self.path, "no saved asset database; starting empty");
            return Ok(AssetDatabase::new());
        }

        let contents = self.fs.read_to_string(&self.path)?;
        let mut db: AssetDatabase = serde_json::from_str(&contents)
            .with_context(|| format!("parsing asset database {:?}", self.path))?;
        db.rebuild_indexes();

        info!(
            path = ?self.path,
            sources = db.sources().count(),
            "loaded asset database"
        );
        Ok(db)
    }

    fn save(&mut self, db: &AssetDatabase) -> Result<()> {
        let json = serde_json::to_vec_pretty(db).context("serializing asset database")?;
        let temp = self.temp_path();
        self.fs.write(&temp, &json)?;
        self.fs.rename(&temp, &self.path)?;
        debug!(path = ?self.path, bytes = json.len(), "saved asset database");
        Ok(())
    }
}

/// Keeps the last saved database in memory only.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    saved: Option<AssetDatabase>,
    saves: usize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `save` was called.
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<AssetDatabase> {
        let mut db = self.saved.clone().unwrap_or_default();
        db.rebuild_indexes();
        Ok(db)
    }

    fn save(&mut self, db: &AssetDatabase) -> Result<()> {
        self.saved = Some(db.clone());
        self.saves += 1;
        Ok(())
    }
}
