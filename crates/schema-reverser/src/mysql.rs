//! Target-side (MySQL/TiDB) reverser.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sync_core::sql::{qualified_name, quote_literal};
use sync_core::ExecutionGateway;

use crate::{filter_intersection, SchemaReverser};

/// Answers schema questions against `information_schema` on the target.
pub struct MySQLReverser {
    gateway: Arc<dyn ExecutionGateway>,
}

impl MySQLReverser {
    pub fn new(gateway: Arc<dyn ExecutionGateway>) -> Self {
        Self { gateway }
    }

    /// Rename `table` to `<table>_bak` so a fresh copy can be created.
    pub async fn rename_table_to_backup(&self, schema: &str, table: &str) -> Result<String> {
        let backup = format!("{table}_bak");
        let sql = format!(
            "RENAME TABLE {} TO {}",
            qualified_name(schema, table),
            qualified_name(schema, &backup)
        );
        tracing::info!(schema, table, sql = %sql, "Exec SQL");
        self.gateway
            .execute(&sql)
            .await
            .with_context(|| format!("Failed to back up table {schema}.{table}"))?;
        Ok(backup)
    }

    /// Table names of `schema` intersected with `include`.
    pub async fn filter_existing_tables(
        &self,
        schema: &str,
        include: &[String],
    ) -> Result<Vec<String>> {
        let tables = self.list_tables(schema).await?;
        Ok(filter_intersection(&tables, include))
    }
}

#[async_trait]
impl SchemaReverser for MySQLReverser {
    async fn schema_exists(&self, schema: &str) -> Result<bool> {
        let output = self
            .gateway
            .execute("SELECT DISTINCT(schema_name) AS SCHEMA_NAME FROM information_schema.SCHEMATA")
            .await
            .context("Failed to list MySQL schemas")?;
        Ok(output
            .column_values("SCHEMA_NAME")
            .iter()
            .any(|s| s.eq_ignore_ascii_case(schema)))
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let output = self
            .gateway
            .execute(&format!(
                "SELECT table_name AS TABLE_NAME FROM information_schema.tables \
WHERE UPPER(table_schema) = UPPER({}) AND UPPER(table_type) = 'BASE TABLE'",
                quote_literal(Some(schema))
            ))
            .await
            .with_context(|| format!("Failed to list tables of MySQL schema {schema}"))?;
        Ok(output
            .column_values("TABLE_NAME")
            .into_iter()
            .map(|t| t.to_uppercase())
            .collect())
    }

    async fn index_exists(&self, schema: &str, table: &str, index: &str) -> Result<bool> {
        let output = self
            .gateway
            .execute(&format!(
                "SELECT COUNT(1) AS CT FROM information_schema.statistics \
WHERE UPPER(table_schema) = UPPER({}) AND UPPER(table_name) = UPPER({}) AND UPPER(index_name) = UPPER({})",
                quote_literal(Some(schema)),
                quote_literal(Some(table)),
                quote_literal(Some(index))
            ))
            .await?;
        Ok(output.scalar().is_some_and(|ct| ct != "0"))
    }

    async fn partitioned_tables(&self, schema: &str, tables: &[String]) -> Result<Vec<String>> {
        let output = self
            .gateway
            .execute(&format!(
                "SELECT DISTINCT table_name AS TABLE_NAME FROM information_schema.partitions \
WHERE UPPER(table_schema) = UPPER({}) AND partition_name IS NOT NULL",
                quote_literal(Some(schema))
            ))
            .await?;
        Ok(filter_intersection(tables, &output.column_values("TABLE_NAME")))
    }
}
