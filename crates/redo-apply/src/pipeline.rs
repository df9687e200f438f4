//! Bounded per-table apply pipeline.
//!
//! One producer (the translator) feeds a bounded queue, N workers take
//! payloads from it and a single collector folds their results. The
//! collector's join handle is the table's completion event: it resolves
//! once every worker has dropped its result sender.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use checkpoint::{CheckpointKey, CheckpointStore};
use sync_core::{
    ApplyFailureKind, ApplyPayload, ApplyResult, ChangeRecord, ExecutionGateway, OperationKind,
    ReplicationMarker,
};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{ApplyContext, ApplyError, FailedPayload};

/// Outcome of one table's pipeline in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub table: String,
    /// Payloads whose statements committed and whose checkpoint was written
    pub applied: usize,
    /// Records at or behind the stored checkpoint, dropped before translation
    pub skipped_by_checkpoint: usize,
    /// Highest marker applied this cycle
    pub final_marker: Option<ReplicationMarker>,
    pub elapsed: Duration,
}

impl PipelineReport {
    fn idle(table: &str, skipped_by_checkpoint: usize, started: Instant) -> Self {
        Self {
            table: table.to_string(),
            applied: 0,
            skipped_by_checkpoint,
            final_marker: None,
            elapsed: started.elapsed(),
        }
    }
}

/// Decides how far a table's checkpoint may move while payloads commit out
/// of order.
///
/// The stored marker only ever covers a gap-free prefix of the queued
/// payloads: it stays below every payload still in a worker's hands and
/// below the lowest payload whose statements failed, so a restart replays
/// everything that did not commit.
#[derive(Default)]
struct CheckpointGate {
    in_flight: BTreeSet<ReplicationMarker>,
    committed: BTreeMap<ReplicationMarker, OperationKind>,
    lowest_failed: Option<ReplicationMarker>,
}

impl CheckpointGate {
    /// Must run while the queue lock is held so that markers are taken in
    /// queue order.
    fn begin(&mut self, marker: ReplicationMarker) {
        self.in_flight.insert(marker);
    }

    fn fail(&mut self, marker: ReplicationMarker) {
        self.in_flight.remove(&marker);
        self.lowest_failed = Some(self.lowest_failed.map_or(marker, |failed| failed.min(marker)));
    }

    /// Record a commit and return the marker the checkpoint may now move to.
    fn commit(
        &mut self,
        marker: ReplicationMarker,
        operation: OperationKind,
    ) -> Option<(ReplicationMarker, OperationKind)> {
        self.in_flight.remove(&marker);
        self.committed.insert(marker, operation);

        let limit = match (self.in_flight.first(), self.lowest_failed) {
            (Some(pending), Some(failed)) => Some((*pending).min(failed)),
            (Some(pending), None) => Some(*pending),
            (None, failed) => failed,
        };
        let safe = match limit {
            Some(limit) => self.committed.range(..limit).next_back(),
            None => self.committed.last_key_value(),
        }
        .map(|(marker, operation)| (*marker, *operation))?;

        self.committed.retain(|marker, _| *marker > safe.0);
        Some(safe)
    }
}

type SharedGate = Arc<std::sync::Mutex<CheckpointGate>>;

fn lock_gate(gate: &SharedGate) -> std::sync::MutexGuard<'_, CheckpointGate> {
    gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Execute one payload as a single transaction, then advance its table's
/// checkpoint as far as the gate allows.
///
/// The checkpoint is never advanced when the statements fail. A failed
/// checkpoint write after a successful commit is reported as a
/// [`ApplyFailureKind::Checkpoint`] failure: the target is already ahead of
/// the stored marker and those records will be applied again after a
/// restart.
async fn apply_payload(
    gateway: &dyn ExecutionGateway,
    store: &dyn CheckpointStore,
    gate: &SharedGate,
    payload: &ApplyPayload,
) -> ApplyResult {
    if let Err(e) = gateway.execute_batch(&payload.statements).await {
        error!(
            "apply payload failed on {}.{}: {:#}, payload: {}",
            payload.target_schema,
            payload.target_table,
            e,
            payload.marshal()
        );
        lock_gate(gate).fail(payload.marker);
        return ApplyResult::failure(payload, ApplyFailureKind::Statement, format!("{e:#}"));
    }

    let key = CheckpointKey::new(&payload.source_schema, &payload.source_table);
    let advance_to = lock_gate(gate).commit(payload.marker, payload.operation);
    let Some((marker, operation)) = advance_to else {
        debug!(
            "applied {} records of {} at {}, checkpoint held behind an earlier payload",
            payload.record_count, key, payload.marker
        );
        return ApplyResult::success(payload);
    };

    match store.advance(&key, operation, marker).await {
        Ok(true) => {
            debug!("applied {} records of {}, checkpoint at {}", payload.record_count, key, marker);
            ApplyResult::success(payload)
        }
        Ok(false) => {
            debug!(
                "applied {} records of {}, checkpoint already at or beyond {}",
                payload.record_count, key, marker
            );
            ApplyResult::success(payload)
        }
        Err(e) => {
            error!(
                "update table increment scn record failed: {:#}, payload: {}",
                e,
                payload.marshal()
            );
            ApplyResult::failure(payload, ApplyFailureKind::Checkpoint, format!("{e:#}"))
        }
    }
}

async fn worker(
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<ApplyPayload>>>,
    results: mpsc::UnboundedSender<ApplyResult>,
    gateway: Arc<dyn ExecutionGateway>,
    store: Arc<dyn CheckpointStore>,
    gate: SharedGate,
    cancel: CancellationToken,
) {
    loop {
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("apply worker {} stopped by cancellation", id);
                break;
            }
            next = async {
                let mut queue = queue.lock().await;
                let next = queue.recv().await;
                if let Some(payload) = &next {
                    lock_gate(&gate).begin(payload.marker);
                }
                next
            } => match next {
                Some(payload) => payload,
                None => break,
            },
        };

        let result = apply_payload(gateway.as_ref(), store.as_ref(), &gate, &payload).await;
        if results.send(result).is_err() {
            break;
        }
    }
}

#[derive(Default)]
struct Collected {
    applied: usize,
    failures: Vec<FailedPayload>,
    final_marker: Option<ReplicationMarker>,
}

async fn collect(mut results: mpsc::UnboundedReceiver<ApplyResult>) -> Collected {
    let mut collected = Collected::default();
    while let Some(result) = results.recv().await {
        match result.outcome {
            Ok(()) => {
                collected.applied += 1;
                collected.final_marker = collected.final_marker.max(Some(result.marker));
            }
            Err((kind, error)) => collected.failures.push(FailedPayload {
                marker: result.marker,
                kind,
                error,
            }),
        }
    }
    collected.failures.sort_by_key(|f| f.marker);
    collected
}

/// Apply one table's change records for this cycle.
///
/// Records at or behind the table's stored checkpoint are dropped first.
/// Payload failures don't stop the pipeline: the queue drains, and the
/// failures come back together as [`ApplyError::Apply`]. A translation
/// failure cancels the workers (each finishes the payload it holds) and is
/// returned as the fatal [`ApplyError::Translation`].
pub async fn run_table_pipeline(
    ctx: &ApplyContext,
    table: &str,
    records: Vec<ChangeRecord>,
) -> Result<PipelineReport, ApplyError> {
    let started = Instant::now();
    let Some(first) = records.first() else {
        return Ok(PipelineReport::idle(table, 0, started));
    };

    let key = CheckpointKey::new(&first.source_schema, &first.source_table);
    let stored = ctx
        .checkpoints
        .read_checkpoint(&key)
        .await
        .map_err(|e| ApplyError::Checkpoint {
            table: table.to_string(),
            reason: format!("{e:#}"),
        })?;

    let captured = records.len();
    let pending: Vec<ChangeRecord> = match &stored {
        Some(checkpoint) => records
            .into_iter()
            .filter(|r| r.marker.is_after(&checkpoint.marker))
            .collect(),
        None => records,
    };
    let skipped = captured - pending.len();
    if skipped > 0 {
        info!(
            "table {} skipped {} records at or behind checkpoint {}",
            key,
            skipped,
            stored.as_ref().map(|c| c.marker).unwrap_or_default()
        );
    }
    if pending.is_empty() {
        return Ok(PipelineReport::idle(table, skipped, started));
    }

    let workers_count = ctx.config.worker_threads.max(1);
    info!(
        "table {} increment applier start, records: {}, workers: {}",
        key,
        pending.len(),
        workers_count
    );

    let (task_tx, task_rx) = mpsc::channel(ctx.config.worker_queue.max(1));
    let task_rx = Arc::new(Mutex::new(task_rx));
    let (result_tx, result_rx) = mpsc::unbounded_channel();
    let gate = SharedGate::default();
    let cancel = CancellationToken::new();

    let collector = tokio::spawn(collect(result_rx));
    let workers: Vec<_> = (0..workers_count)
        .map(|id| {
            tokio::spawn(worker(
                id,
                task_rx.clone(),
                result_tx.clone(),
                ctx.gateway.clone(),
                ctx.checkpoints.clone(),
                gate.clone(),
                cancel.clone(),
            ))
        })
        .collect();
    // Only workers hold the queue's receiving end: if they all die, sends fail
    // instead of blocking on a full queue.
    drop(task_rx);
    drop(result_tx);

    let fed = ctx.translator().feed(&pending, &task_tx, &cancel).await;
    // Closing the queue lets idle workers exit once it drains.
    drop(task_tx);
    if let Err(e) = &fed {
        error!("table {} stopped queueing payloads, stopping workers: {}", key, e);
        cancel.cancel();
    }

    let mut panicked = None;
    for joined in futures::future::join_all(workers).await {
        if let Err(e) = joined {
            panicked.get_or_insert_with(|| e.to_string());
        }
    }
    let collected = collector.await.map_err(|e| ApplyError::Incomplete {
        scope: table.to_string(),
        reason: format!("result collector failed: {e}"),
    })?;

    let queued = fed?;
    if let Some(reason) = panicked {
        return Err(ApplyError::Incomplete {
            scope: table.to_string(),
            reason: format!("apply worker failed: {reason}"),
        });
    }
    let reported = collected.applied + collected.failures.len();
    if reported != queued {
        return Err(ApplyError::Incomplete {
            scope: table.to_string(),
            reason: format!("{reported} of {queued} payloads reported a result"),
        });
    }
    if !collected.failures.is_empty() {
        return Err(ApplyError::Apply {
            table: table.to_string(),
            total: queued,
            failures: collected.failures,
        });
    }

    let report = PipelineReport {
        table: table.to_string(),
        applied: collected.applied,
        skipped_by_checkpoint: skipped,
        final_marker: collected.final_marker,
        elapsed: started.elapsed(),
    };
    info!(
        "table {} increment applier finished, payloads: {}, final marker: {}, cost: {:?}",
        key,
        report.applied,
        report.final_marker.unwrap_or_default(),
        report.elapsed
    );
    Ok(report)
}
