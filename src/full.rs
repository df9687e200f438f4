//! Full-load entry point.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use redo_apply::{apply_full_load, FullLoadReport};
use sync_core::ExecutionGateway;

use crate::Config;

/// Split a statements file on `;` line endings. Blank entries are dropped.
pub fn split_statements(content: &str) -> Vec<String> {
    content
        .split(";\n")
        .map(|s| s.trim().trim_end_matches(';').trim_end())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn run_full_load(
    config: &Config,
    gateway: Arc<dyn ExecutionGateway>,
    table: &str,
    statements_file: &Path,
) -> Result<FullLoadReport> {
    let content = std::fs::read_to_string(statements_file).with_context(|| {
        format!(
            "Failed to read statements file {}",
            statements_file.display()
        )
    })?;
    let statements = split_statements(&content);
    tracing::info!(
        "Loaded {} statements for {}.{} from {}",
        statements.len(),
        config.target.schema,
        table,
        statements_file.display()
    );

    let report = apply_full_load(
        gateway,
        &config.target.schema,
        table,
        config.full.worker_threads,
        statements,
    )
    .await?;
    Ok(report)
}
