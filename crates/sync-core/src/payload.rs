//! Units of apply work and their outcomes.

use serde::{Deserialize, Serialize};

use crate::{OperationKind, ReplicationMarker};

/// One unit of work submitted to an apply worker.
///
/// `statements` execute together as one transaction against the target.
/// `marker` is the position the table checkpoint advances to once they
/// commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyPayload {
    pub source_schema: String,
    pub source_table: String,
    pub target_schema: String,
    pub target_table: String,
    pub operation: OperationKind,
    pub marker: ReplicationMarker,
    pub statements: Vec<String>,
    /// Number of change records folded into this payload.
    pub record_count: usize,
}

impl ApplyPayload {
    /// Compact JSON form for error logs.
    pub fn marshal(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

/// Why a payload failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyFailureKind {
    /// The target rejected the statements; nothing was committed.
    Statement,
    /// The statements committed but the checkpoint write failed.
    Checkpoint,
}

/// Outcome of executing one [`ApplyPayload`]. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyResult {
    pub source_table: String,
    pub marker: ReplicationMarker,
    pub outcome: Result<(), (ApplyFailureKind, String)>,
}

impl ApplyResult {
    pub fn success(payload: &ApplyPayload) -> Self {
        Self {
            source_table: payload.source_table.clone(),
            marker: payload.marker,
            outcome: Ok(()),
        }
    }

    pub fn failure(payload: &ApplyPayload, kind: ApplyFailureKind, error: String) -> Self {
        Self {
            source_table: payload.source_table.clone(),
            marker: payload.marker,
            outcome: Err((kind, error)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
