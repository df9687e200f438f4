//! Table-level fan-out for one captured log unit.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use sync_core::ChangeRecord;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::pipeline::run_table_pipeline;
use crate::{ApplyContext, ApplyError, PipelineReport, TableFailure};

/// Successful outcome of one log-unit apply cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub tables: Vec<PipelineReport>,
    /// Tables with no captured records this cycle
    pub idle_tables: Vec<String>,
}

impl CycleReport {
    pub fn applied(&self) -> usize {
        self.tables.iter().map(|t| t.applied).sum()
    }
}

/// Apply one log unit, running at most `apply_threads` table pipelines at
/// once. Waits for every table; if any failed, returns a single
/// [`ApplyError::Cycle`] naming each failed table.
pub async fn apply_log_unit(
    ctx: &ApplyContext,
    tables: BTreeMap<String, Vec<ChangeRecord>>,
) -> Result<CycleReport, ApplyError> {
    let started = Instant::now();
    let total = tables.len();
    let limit = Arc::new(Semaphore::new(ctx.config.apply_threads.max(1)));
    let mut report = CycleReport::default();
    let mut handles = Vec::new();

    for (table, records) in tables {
        if records.is_empty() {
            warn!("table {} no data captured, continue", table);
            report.idle_tables.push(table);
            continue;
        }

        let permit = limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ApplyError::Incomplete {
                scope: table.clone(),
                reason: format!("apply thread limit closed: {e}"),
            })?;
        let ctx = ctx.clone();
        let name = table.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            run_table_pipeline(&ctx, &name, records).await
        });
        handles.push((table, handle));
    }

    let mut failures = Vec::new();
    for (table, handle) in handles {
        match handle.await {
            Ok(Ok(table_report)) => report.tables.push(table_report),
            Ok(Err(e)) => {
                error!("table {} apply failed: {}", table, e);
                failures.push(TableFailure { table, error: e });
            }
            Err(e) => {
                error!("table {} apply task did not complete: {}", table, e);
                let error = ApplyError::Incomplete {
                    scope: table.clone(),
                    reason: e.to_string(),
                };
                failures.push(TableFailure { table, error });
            }
        }
    }

    if !failures.is_empty() {
        return Err(ApplyError::Cycle { total, failures });
    }

    info!(
        "log unit applied, tables: {}, idle: {}, payloads: {}, cost: {:?}",
        report.tables.len(),
        report.idle_tables.len(),
        report.applied(),
        started.elapsed()
    );
    Ok(report)
}
