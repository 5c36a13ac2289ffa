//! JSON file backend.
//!
//! The snapshot is written to `<path>.tmp`, flushed to disk, then renamed
//! over `<path>`. A crash at any point leaves either the old or the new
//! document, never a truncated one.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::LedgerStore;
use crate::types::Snapshot;

pub struct JsonFileStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut tmp: OsString = path.as_os_str().to_owned();
        tmp.push(".tmp");
        Self {
            path,
            tmp_path: PathBuf::from(tmp),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the data file (for testing or reset).
    pub async fn delete(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .await
                .with_context(|| format!("Failed to delete {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for JsonFileStore {
    async fn load(&self) -> Result<Snapshot> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No saved data found, starting fresh");
            return Ok(Snapshot::default());
        }

        let json = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        let snapshot: Snapshot = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;

        Ok(snapshot)
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot).context("Failed to serialise snapshot")?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let mut file = fs::File::create(&self.tmp_path)
            .await
            .with_context(|| format!("Failed to create {}", self.tmp_path.display()))?;
        file.write_all(&json)
            .await
            .with_context(|| format!("Failed to write {}", self.tmp_path.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("Failed to flush {}", self.tmp_path.display()))?;
        drop(file);

        fs::rename(&self.tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(
            path = %self.path.display(),
            bytes = json.len(),
            parlays = snapshot.parlays.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
