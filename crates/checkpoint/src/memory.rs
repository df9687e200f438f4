//! In-memory checkpoint storage.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use sync_core::{OperationKind, ReplicationMarker};
use tokio::sync::Mutex;

use crate::store::{CheckpointKey, CheckpointStore, TableCheckpoint};

/// Keeps checkpoints in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    checkpoints: Mutex<BTreeMap<CheckpointKey, TableCheckpoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a checkpoint, bypassing the monotonic guard.
    pub async fn seed(&self, checkpoint: TableCheckpoint) {
        self.checkpoints
            .lock()
            .await
            .insert(checkpoint.key(), checkpoint);
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn read_checkpoint(&self, key: &CheckpointKey) -> Result<Option<TableCheckpoint>> {
        Ok(self.checkpoints.lock().await.get(key).cloned())
    }

    async fn advance(
        &self,
        key: &CheckpointKey,
        operation: OperationKind,
        marker: ReplicationMarker,
    ) -> Result<bool> {
        let mut checkpoints = self.checkpoints.lock().await;
        if let Some(current) = checkpoints.get(key) {
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
        checkpoints.insert(key.clone(), TableCheckpoint::new(key, operation, marker));
        Ok(true)
    }

    async fn list_checkpoints(&self) -> Result<Vec<TableCheckpoint>> {
        Ok(self.checkpoints.lock().await.values().cloned().collect())
    }
}
