//! Incremental apply loop over captured log units.

use anyhow::Result;
use redo_apply::{apply_log_unit, group_by_table, ApplyContext, ChangeSource};

/// Totals over every log unit applied by [`run_incremental`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncrementalSummary {
    pub log_units: usize,
    pub payloads: usize,
}

/// Apply log units from `source` in capture order until it is exhausted.
///
/// Only change records of `schema` are applied; `tables` narrows them
/// further when non-empty.
///
/// Stops at the first failed cycle. Checkpoints of the tables that did
/// commit are kept, so running again resumes after them.
pub async fn run_incremental(
    ctx: &ApplyContext,
    source: &mut dyn ChangeSource,
    schema: &str,
    tables: &[String],
) -> Result<IncrementalSummary> {
    let mut summary = IncrementalSummary::default();

    while let Some(records) = source.next_log_unit().await? {
        let unit = summary.log_units + 1;
        tracing::info!("Applying log unit {} with {} change records", unit, records.len());

        match apply_log_unit(ctx, group_by_table(records, schema, tables)).await {
            Ok(report) => {
                summary.log_units = unit;
                summary.payloads += report.applied();
            }
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!(
                        "Log unit {} hit an untranslatable change record; stopping replication",
                        unit
                    );
                }
                return Err(anyhow::Error::new(e)
                    .context(format!("Log unit {unit} failed after {} applied", summary.log_units)));
            }
        }
    }

    tracing::info!(
        "Incremental apply finished: {} log units, {} payloads",
        summary.log_units,
        summary.payloads
    );
    Ok(summary)
}
