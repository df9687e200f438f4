//! Checkpoint storage trait and types
//!
//! This module defines the CheckpointStore trait for backend-agnostic
//! checkpoint storage operations, plus shared types.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sync_core::{OperationKind, ReplicationMarker};

/// Checkpoint identifier: one source table.
///
/// Names are upper-cased on construction, matching how the source engine
/// stores unquoted identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckpointKey {
    pub source_schema: String,
    pub source_table: String,
}

impl CheckpointKey {
    pub fn new(source_schema: &str, source_table: &str) -> Self {
        Self {
            source_schema: source_schema.to_uppercase(),
            source_table: source_table.to_uppercase(),
        }
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.source_schema, self.source_table)
    }
}

/// Last successfully applied position of one source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCheckpoint {
    pub source_schema: String,
    pub source_table: String,
    pub marker: ReplicationMarker,
    /// Operation kind of the payload that produced this checkpoint
    pub operation: OperationKind,
    pub updated_at: DateTime<Utc>,
}

impl TableCheckpoint {
    pub fn new(key: &CheckpointKey, operation: OperationKind, marker: ReplicationMarker) -> Self {
        Self {
            source_schema: key.source_schema.clone(),
            source_table: key.source_table.clone(),
            marker,
            operation,
            updated_at: Utc::now(),
        }
    }

    pub fn key(&self) -> CheckpointKey {
        CheckpointKey::new(&self.source_schema, &self.source_table)
    }
}

/// Trait for checkpoint storage operations.
///
/// Implementations must make `advance` durable before returning `Ok`, and
/// must never move a stored marker backward.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the checkpoint of one table.
    ///
    /// Returns None if the table has no prior checkpoint (full resync required).
    async fn read_checkpoint(&self, key: &CheckpointKey) -> Result<Option<TableCheckpoint>>;

    /// Advance the table checkpoint to `marker`.
    ///
    /// Returns `false` when the write was discarded because the stored
    /// marker is already at or beyond `marker`.
    async fn advance(
        &self,
        key: &CheckpointKey,
        operation: OperationKind,
        marker: ReplicationMarker,
    ) -> Result<bool>;

    /// All stored checkpoints, ordered by key.
    async fn list_checkpoints(&self) -> Result<Vec<TableCheckpoint>>;
}
