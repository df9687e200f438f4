//! Checkpoint storage in a meta table on the target database.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sync_core::sql::{qualified_name, quote_ident, quote_literal};
use sync_core::{ExecutionGateway, OperationKind, ReplicationMarker};

use crate::store::{CheckpointKey, CheckpointStore, TableCheckpoint};

/// Name of the checkpoint meta table inside the meta schema.
pub const META_TABLE: &str = "table_increment_meta";

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Stores checkpoints in `<meta_schema>.table_increment_meta` through an
/// [`ExecutionGateway`].
///
/// Each advance is a single `INSERT ... ON DUPLICATE KEY UPDATE`, which is
/// an atomic per-table upsert on MySQL and TiDB. The update clause only
/// takes the offered values when they are strictly ahead of the stored
/// marker.
pub struct GatewayStore {
    gateway: Arc<dyn ExecutionGateway>,
    meta_schema: String,
}

impl GatewayStore {
    pub fn new(gateway: Arc<dyn ExecutionGateway>, meta_schema: impl Into<String>) -> Self {
        Self {
            gateway,
            meta_schema: meta_schema.into(),
        }
    }

    fn table(&self) -> String {
        qualified_name(&self.meta_schema, META_TABLE)
    }

    /// Create the meta schema and table if they do not exist.
    pub async fn ensure_table(&self) -> Result<()> {
        self.gateway
            .execute(&format!(
                "CREATE DATABASE IF NOT EXISTS {}",
                quote_ident(&self.meta_schema)
            ))
            .await
            .with_context(|| format!("Failed to create meta schema '{}'", self.meta_schema))?;
        self.gateway
            .execute(&create_table_sql(&self.table()))
            .await
            .with_context(|| format!("Failed to create checkpoint table {}", self.table()))?;
        Ok(())
    }

    fn row_to_checkpoint(
        row: &std::collections::HashMap<String, String>,
    ) -> Result<TableCheckpoint> {
        let field = |name: &str| {
            row.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("Missing column {name} in checkpoint row"))
        };

        let global_scn: u64 = field("global_scn")?
            .parse()
            .context("Invalid global_scn in checkpoint row")?;
        let table_scn: u64 = field("source_table_scn")?
            .parse()
            .context("Invalid source_table_scn in checkpoint row")?;
        let operation: OperationKind = field("operation_type")?.parse()?;
        let updated_at = NaiveDateTime::parse_from_str(field("updated_at")?, DATETIME_FORMAT)
            .context("Invalid updated_at in checkpoint row")?
            .and_utc();

        Ok(TableCheckpoint {
            source_schema: field("source_schema")?.to_string(),
            source_table: field("source_table")?.to_string(),
            marker: ReplicationMarker::new(global_scn, table_scn),
            operation,
            updated_at,
        })
    }
}

fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
  source_schema VARCHAR(128) NOT NULL,
  source_table VARCHAR(128) NOT NULL,
  global_scn BIGINT UNSIGNED NOT NULL,
  source_table_scn BIGINT UNSIGNED NOT NULL,
  operation_type VARCHAR(16) NOT NULL,
  updated_at DATETIME(6) NOT NULL,
  PRIMARY KEY (source_schema, source_table)
)"
    )
}

/// Upsert guarded by the marker order.
///
/// Assignments in `ON DUPLICATE KEY UPDATE` run left to right and later ones
/// see earlier results, so `global_scn` is assigned last and uses GREATEST:
/// whenever the guard holds the new global SCN is >= the stored one.
fn advance_sql(
    table: &str,
    key: &CheckpointKey,
    operation: OperationKind,
    marker: ReplicationMarker,
) -> String {
    let ahead = "(VALUES(global_scn), VALUES(source_table_scn)) > (global_scn, source_table_scn)";
    format!(
        "INSERT INTO {table} (source_schema, source_table, global_scn, source_table_scn, operation_type, updated_at) \
VALUES ({schema}, {tbl}, {global}, {table_scn}, {op}, {now}) \
ON DUPLICATE KEY UPDATE \
operation_type = IF({ahead}, VALUES(operation_type), operation_type), \
updated_at = IF({ahead}, VALUES(updated_at), updated_at), \
source_table_scn = IF({ahead}, VALUES(source_table_scn), source_table_scn), \
global_scn = GREATEST(global_scn, VALUES(global_scn))",
        schema = quote_literal(Some(&key.source_schema)),
        tbl = quote_literal(Some(&key.source_table)),
        global = marker.global_scn,
        table_scn = marker.table_scn,
        op = quote_literal(Some(operation.as_str())),
        now = quote_literal(Some(&Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string())),
    )
}

#[async_trait]
impl CheckpointStore for GatewayStore {
    async fn read_checkpoint(&self, key: &CheckpointKey) -> Result<Option<TableCheckpoint>> {
        let output = self
            .gateway
            .execute(&format!(
                "SELECT source_schema, source_table, global_scn, source_table_scn, operation_type, updated_at \
FROM {} WHERE source_schema = {} AND source_table = {}",
                self.table(),
                quote_literal(Some(&key.source_schema)),
                quote_literal(Some(&key.source_table)),
            ))
            .await
            .with_context(|| format!("Failed to read checkpoint for {key}"))?;

        output
            .rows
            .first()
            .map(Self::row_to_checkpoint)
            .transpose()
    }

    async fn advance(
        &self,
        key: &CheckpointKey,
        operation: OperationKind,
        marker: ReplicationMarker,
    ) -> Result<bool> {
        let output = self
            .gateway
            .execute(&advance_sql(&self.table(), key, operation, marker))
            .await
            .with_context(|| format!("Failed to advance checkpoint for {key} to {marker}"))?;
        // 1 = inserted, 2 = updated, 0 = guard kept the stored row
        Ok(output.affected_rows > 0)
    }

    async fn list_checkpoints(&self) -> Result<Vec<TableCheckpoint>> {
        let output = self
            .gateway
            .execute(&format!(
                "SELECT source_schema, source_table, global_scn, source_table_scn, operation_type, updated_at \
FROM {} ORDER BY source_schema, source_table",
                self.table()
            ))
            .await
            .context("Failed to list checkpoints")?;

        output.rows.iter().map(Self::row_to_checkpoint).collect()
    }
}
