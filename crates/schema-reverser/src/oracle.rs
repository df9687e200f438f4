//! Source-side (Oracle) reverser.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sync_core::sql::quote_literal;
use sync_core::ExecutionGateway;

use crate::{filter_intersection, SchemaReverser};

/// Answers schema questions against the Oracle data dictionary.
pub struct OracleReverser {
    gateway: Arc<dyn ExecutionGateway>,
}

impl OracleReverser {
    pub fn new(gateway: Arc<dyn ExecutionGateway>) -> Self {
        Self { gateway }
    }
}

fn upper_literal(name: &str) -> String {
    quote_literal(Some(&name.to_uppercase()))
}

#[async_trait]
impl SchemaReverser for OracleReverser {
    async fn schema_exists(&self, schema: &str) -> Result<bool> {
        let output = self
            .gateway
            .execute("SELECT DISTINCT username AS USERNAME FROM ALL_USERS")
            .await
            .context("Failed to list Oracle schemas")?;
        Ok(output
            .column_values("USERNAME")
            .iter()
            .any(|s| s.eq_ignore_ascii_case(schema)))
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let output = self
            .gateway
            .execute(&format!(
                "SELECT table_name AS TABLE_NAME FROM ALL_TABLES WHERE UPPER(owner) = {}",
                upper_literal(schema)
            ))
            .await
            .with_context(|| format!("Failed to list tables of Oracle schema {schema}"))?;
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
                "SELECT COUNT(1) AS CT FROM ALL_INDEXES \
WHERE UPPER(owner) = {} AND UPPER(table_name) = {} AND UPPER(index_name) = {}",
                upper_literal(schema),
                upper_literal(table),
                upper_literal(index)
            ))
            .await?;
        Ok(output.scalar().is_some_and(|ct| ct != "0"))
    }

    async fn partitioned_tables(&self, schema: &str, tables: &[String]) -> Result<Vec<String>> {
        let output = self
            .gateway
            .execute(&format!(
                "SELECT table_name AS TABLE_NAME FROM DBA_TABLES \
WHERE partitioned = 'YES' AND UPPER(owner) = {}",
                upper_literal(schema)
            ))
            .await
            .with_context(|| format!("Failed to list partitioned tables of {schema}"))?;
        Ok(filter_intersection(tables, &output.column_values("TABLE_NAME")))
    }
}
