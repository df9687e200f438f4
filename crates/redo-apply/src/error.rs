//! Apply error taxonomy.

use sync_core::{ApplyFailureKind, ReplicationMarker};

/// One payload that did not apply.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedPayload {
    pub marker: ReplicationMarker,
    pub kind: ApplyFailureKind,
    pub error: String,
}

/// A table whose pipeline failed within a cycle.
#[derive(Debug)]
pub struct TableFailure {
    pub table: String,
    pub error: ApplyError,
}

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// A change record could not be turned into statements. Fatal for the
    /// table: skipping it would desynchronize the target for good.
    #[error("translation of {table} change at {marker} failed: {reason}")]
    Translation {
        table: String,
        marker: ReplicationMarker,
        reason: String,
    },

    /// One or more payloads failed; their checkpoints were not advanced.
    #[error("table {table}: {} of {total} payloads failed, first error: {}", .failures.len(), first_error(.failures))]
    Apply {
        table: String,
        total: usize,
        failures: Vec<FailedPayload>,
    },

    /// Reading the resume checkpoint failed before anything was applied.
    #[error("table {table}: checkpoint read failed: {reason}")]
    Checkpoint { table: String, reason: String },

    /// A worker pool did not drain completely (task panicked or channel
    /// closed early), even if no explicit error was recorded.
    #[error("{scope}: worker pool did not complete: {reason}")]
    Incomplete { scope: String, reason: String },

    /// Aggregate of a log-unit apply cycle.
    #[error("apply cycle failed for {} of {total} tables: {}", .failures.len(), describe(.failures))]
    Cycle {
        total: usize,
        failures: Vec<TableFailure>,
    },

    /// A full-load bulk statement failed. `completed` of the `dispatched`
    /// statements committed before the pool drained.
    #[error("full load of {schema}.{table} failed, {completed} of {dispatched} dispatched statements completed: {reason}")]
    FullLoad {
        schema: String,
        table: String,
        dispatched: usize,
        completed: usize,
        reason: String,
    },
}

impl ApplyError {
    /// Fatal errors mean the translated stream can't be trusted; the caller
    /// should stop rather than retry the cycle.
    pub fn is_fatal(&self) -> bool {
        match self {
            ApplyError::Translation { .. } => true,
            ApplyError::Cycle { failures, .. } => failures.iter().any(|f| f.error.is_fatal()),
            _ => false,
        }
    }

    /// Names of the failed tables for a cycle error.
    pub fn failed_tables(&self) -> Vec<&str> {
        match self {
            ApplyError::Cycle { failures, .. } => {
                failures.iter().map(|f| f.table.as_str()).collect()
            }
            ApplyError::Translation { table, .. }
            | ApplyError::Apply { table, .. }
            | ApplyError::Checkpoint { table, .. } => vec![table.as_str()],
            ApplyError::FullLoad { table, .. } => vec![table.as_str()],
            ApplyError::Incomplete { scope, .. } => vec![scope.as_str()],
        }
    }
}

fn first_error(failures: &[FailedPayload]) -> &str {
    failures.first().map(|f| f.error.as_str()).unwrap_or("none")
}

fn describe(failures: &[TableFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("[{}] {}", f.table, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}
