//! Bounded, fail-fast bulk applier for the initial full load.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sync_core::ExecutionGateway;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::ApplyError;

/// Outcome of a full load in which every statement committed.
#[derive(Debug, Clone, PartialEq)]
pub struct FullLoadReport {
    pub statements: usize,
    pub elapsed: Duration,
}

/// Execute `statements` against `target_schema.target_table` with at most
/// `worker_threads` running at once.
///
/// After the first failure nothing more is dispatched; statements already
/// running finish, and the first error is returned. A pool that did not
/// finish every statement is an error even if no statement reported one.
pub async fn apply_full_load(
    gateway: Arc<dyn ExecutionGateway>,
    target_schema: &str,
    target_table: &str,
    worker_threads: usize,
    statements: Vec<String>,
) -> Result<FullLoadReport, ApplyError> {
    let started = Instant::now();
    info!(
        "single full table data applier start, schema: {}, table: {}, statements: {}",
        target_schema,
        target_table,
        statements.len()
    );

    let total = statements.len();
    let limit = Arc::new(Semaphore::new(worker_threads.max(1)));
    let failed = Arc::new(AtomicBool::new(false));
    let first_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let mut handles = Vec::with_capacity(total);

    for statement in statements {
        let Ok(permit) = limit.clone().acquire_owned().await else {
            break;
        };
        // Checked after the wait so a failure seen while blocked stops dispatch.
        if failed.load(Ordering::SeqCst) {
            break;
        }

        let gateway = gateway.clone();
        let failed = failed.clone();
        let first_error = first_error.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = gateway.execute(&statement).await {
                let message = format!("bulk insert [{statement}] failed: {e:#}");
                error!("{}", message);
                if let Ok(mut slot) = first_error.lock() {
                    slot.get_or_insert(message);
                }
                failed.store(true, Ordering::SeqCst);
                return false;
            }
            true
        }));
    }

    let dispatched = handles.len();
    let mut completed = 0;
    for joined in futures::future::join_all(handles).await {
        if matches!(joined, Ok(true)) {
            completed += 1;
        }
    }

    let recorded = first_error.lock().ok().and_then(|mut slot| slot.take());
    if let Some(reason) = recorded {
        return Err(ApplyError::FullLoad {
            schema: target_schema.to_string(),
            table: target_table.to_string(),
            dispatched,
            completed,
            reason,
        });
    }

    if completed != total {
        return Err(ApplyError::Incomplete {
            scope: format!("{target_schema}.{target_table}"),
            reason: format!(
                "{completed} of {total} full load statements finished, {dispatched} dispatched"
            ),
        });
    }

    let report = FullLoadReport {
        statements: total,
        elapsed: started.elapsed(),
    };
    info!(
        "single full table data applier finished, schema: {}, table: {}, cost: {:?}",
        target_schema, target_table, report.elapsed
    );
    Ok(report)
}
