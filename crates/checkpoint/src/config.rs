//! Checkpoint storage configuration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sync_core::ExecutionGateway;

use crate::{CheckpointStore, FilesystemStore, GatewayStore, MemoryStore};

/// Where table checkpoints are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "storage", rename_all = "snake_case")]
pub enum CheckpointStorage {
    /// One JSON file per table under `dir`.
    Filesystem { dir: String },

    /// `<meta_schema>.table_increment_meta` on the target database.
    Target { meta_schema: String },

    /// Process memory only; checkpoints are lost on exit.
    Memory,
}

impl Default for CheckpointStorage {
    fn default() -> Self {
        CheckpointStorage::Filesystem {
            dir: ".transfer-sync-checkpoints".to_string(),
        }
    }
}

/// Build the configured checkpoint store.
///
/// `target` is required for [`CheckpointStorage::Target`]; the meta table is
/// created if it does not exist yet.
pub async fn open_store(
    storage: &CheckpointStorage,
    target: Option<Arc<dyn ExecutionGateway>>,
) -> anyhow::Result<Arc<dyn CheckpointStore>> {
    match storage {
        CheckpointStorage::Filesystem { dir } => {
            tracing::info!("Using filesystem checkpoint storage in {dir}");
            Ok(Arc::new(FilesystemStore::new(dir)))
        }
        CheckpointStorage::Target { meta_schema } => {
            let gateway = target.ok_or_else(|| {
                anyhow::anyhow!("Target gateway not provided for checkpoint storage")
            })?;
            let store = GatewayStore::new(gateway, meta_schema.clone());
            store.ensure_table().await?;
            tracing::info!("Using target checkpoint storage in schema '{meta_schema}'");
            Ok(Arc::new(store))
        }
        CheckpointStorage::Memory => {
            tracing::warn!("Using in-memory checkpoint storage; progress will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
