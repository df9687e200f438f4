//! Filesystem-based checkpoint storage implementation.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sync_core::{OperationKind, ReplicationMarker};
use tokio::sync::Mutex;

use crate::store::{CheckpointKey, CheckpointStore, TableCheckpoint};

/// Filesystem implementation of CheckpointStore trait.
///
/// Stores one JSON file per table in a directory, named
/// `checkpoint_{SCHEMA}.{TABLE}.json`. Each write goes to a temporary file
/// that is synced and renamed over the previous one, so a table's record is
/// replaced atomically.
pub struct FilesystemStore {
    dir: PathBuf,
    // Serializes read-modify-write of the monotonic guard.
    write_lock: Mutex<()>,
}

impl FilesystemStore {
    /// Create a new FilesystemStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn path_for(&self, key: &CheckpointKey) -> PathBuf {
        self.dir.join(format!(
            "checkpoint_{}.{}.json",
            key.source_schema, key.source_table
        ))
    }

    fn read_file(path: &Path) -> Result<Option<TableCheckpoint>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read checkpoint file {}", path.display()))?;
        let checkpoint = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse checkpoint file {}", path.display()))?;
        Ok(Some(checkpoint))
    }

    fn write_file(&self, path: &Path, checkpoint: &TableCheckpoint) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let tmp = path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(serde_json::to_string_pretty(checkpoint)?.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace checkpoint file {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FilesystemStore {
    async fn read_checkpoint(&self, key: &CheckpointKey) -> Result<Option<TableCheckpoint>> {
        Self::read_file(&self.path_for(key))
    }

    async fn advance(
        &self,
        key: &CheckpointKey,
        operation: OperationKind,
        marker: ReplicationMarker,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let path = self.path_for(key);

        if let Some(current) = Self::read_file(&path)? {
            if !marker.is_after(&current.marker) {
                tracing::debug!(
                    "Discarded stale checkpoint advance for {}: stored {}, offered {}",
                    key,
                    current.marker,
                    marker
                );
                return Ok(false);
            }
        }

        let checkpoint = TableCheckpoint::new(key, operation, marker);
        self.write_file(&path, &checkpoint)?;
        tracing::debug!("Stored checkpoint {} to {}", marker, path.display());
        Ok(true)
    }

    async fn list_checkpoints(&self) -> Result<Vec<TableCheckpoint>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut checkpoints = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().to_string();
            if filename.starts_with("checkpoint_") && filename.ends_with(".json") {
                if let Some(checkpoint) = Self::read_file(&entry.path())? {
                    checkpoints.push(checkpoint);
                }
            }
        }
        checkpoints.sort_by_key(|c| c.key());
        Ok(checkpoints)
    }
}
