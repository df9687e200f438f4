//! In-process gateway and store doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use checkpoint::{CheckpointKey, CheckpointStore, MemoryStore, TableCheckpoint};
use redo_apply::{ApplyConfig, ApplyContext};
use sync_core::{
    ChangeRecord, ExecutionGateway, OperationKind, QueryOutput, RedoContent, ReplicationMarker,
    RowImage,
};

/// Records every batch it is asked to run. Batches containing a statement
/// that matches one of `fail_on` are rejected without being committed.
#[derive(Default)]
pub struct RecordingGateway {
    committed: Mutex<Vec<Vec<String>>>,
    attempted: AtomicUsize,
    fail_on: Vec<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on.push(needle.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn committed(&self) -> Vec<Vec<String>> {
        self.committed.lock().unwrap().clone()
    }

    /// Committed statements flattened in commit order.
    pub fn statements(&self) -> Vec<String> {
        self.committed().into_iter().flatten().collect()
    }

    pub fn attempted(&self) -> usize {
        self.attempted.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Rejections come back at once; only committing batches wait out the
    /// delay.
    async fn run(&self, statements: &[String]) -> Result<u64> {
        self.attempted.fetch_add(1, Ordering::SeqCst);
        let rejected = statements
            .iter()
            .find(|s| self.fail_on.iter().any(|needle| s.contains(needle.as_str())));
        if let Some(statement) = rejected {
            anyhow::bail!("Duplicate entry for [{statement}]");
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.committed.lock().unwrap().push(statements.to_vec());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(statements.len() as u64)
    }
}

#[async_trait]
impl ExecutionGateway for RecordingGateway {
    async fn execute(&self, statement: &str) -> Result<QueryOutput> {
        let affected_rows = self.run(&[statement.to_string()]).await?;
        Ok(QueryOutput {
            affected_rows,
            ..Default::default()
        })
    }

    async fn execute_batch(&self, statements: &[String]) -> Result<u64> {
        self.run(statements).await
    }
}

/// Memory store whose advance fails for one marker.
pub struct FlakyStore {
    inner: MemoryStore,
    fail_at: ReplicationMarker,
}

impl FlakyStore {
    pub fn new(fail_at: ReplicationMarker) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_at,
        }
    }
}

#[async_trait]
impl CheckpointStore for FlakyStore {
    async fn read_checkpoint(&self, key: &CheckpointKey) -> Result<Option<TableCheckpoint>> {
        self.inner.read_checkpoint(key).await
    }

    async fn advance(
        &self,
        key: &CheckpointKey,
        operation: OperationKind,
        marker: ReplicationMarker,
    ) -> Result<bool> {
        if marker == self.fail_at {
            anyhow::bail!("meta table is read-only");
        }
        self.inner.advance(key, operation, marker).await
    }

    async fn list_checkpoints(&self) -> Result<Vec<TableCheckpoint>> {
        self.inner.list_checkpoints().await
    }
}

pub fn context(
    gateway: Arc<RecordingGateway>,
    store: Arc<dyn CheckpointStore>,
    config: ApplyConfig,
) -> ApplyContext {
    ApplyContext::new("steven", gateway, store, config)
}

/// A pre-rendered statement record; the statement text is `"<table>-<scn>"`.
pub fn statement(table: &str, scn: u64) -> ChangeRecord {
    ChangeRecord {
        source_schema: "MARVIN".to_string(),
        source_table: table.to_string(),
        operation: OperationKind::Insert,
        marker: ReplicationMarker::new(scn, scn),
        transaction_id: None,
        content: RedoContent::Statement {
            sql: format!("{table}-{scn}"),
        },
    }
}

/// An insert row record without its after image.
pub fn malformed(table: &str, scn: u64) -> ChangeRecord {
    ChangeRecord {
        content: RedoContent::Row {
            before: None,
            after: None,
        },
        ..statement(table, scn)
    }
}

pub fn row_insert(table: &str, scn: u64, id: &str) -> ChangeRecord {
    let after: RowImage = [("ID".to_string(), Some(id.to_string()))].into_iter().collect();
    ChangeRecord {
        content: RedoContent::Row {
            before: None,
            after: Some(after),
        },
        ..statement(table, scn)
    }
}

pub async fn stored_marker(store: &dyn CheckpointStore, table: &str) -> Option<ReplicationMarker> {
    store
        .read_checkpoint(&CheckpointKey::new("MARVIN", table))
        .await
        .unwrap()
        .map(|c| c.marker)
}
