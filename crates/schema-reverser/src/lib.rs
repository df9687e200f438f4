//! Schema checks run once before synchronization starts.
//!
//! The reverser answers structural questions about the source (Oracle) and
//! target (MySQL/TiDB) schemas through an [`ExecutionGateway`]: does a
//! schema exist, which tables does it hold, does an index exist. DDL
//! generation lives elsewhere; this crate only validates and produces table
//! lists.

mod filter;
mod mysql;
mod oracle;

use anyhow::Result;
use async_trait::async_trait;

pub use filter::{filter_difference, filter_intersection};
pub use mysql::MySQLReverser;
pub use oracle::OracleReverser;

#[async_trait]
pub trait SchemaReverser: Send + Sync {
    /// Whether `schema` exists (case-insensitive).
    async fn schema_exists(&self, schema: &str) -> Result<bool>;

    /// Base tables of `schema`, upper-cased.
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>>;

    /// Whether `table` in `schema` has an index named `index`.
    async fn index_exists(&self, schema: &str, table: &str, index: &str) -> Result<bool>;

    /// The subset of `tables` that are partitioned.
    async fn partitioned_tables(&self, schema: &str, tables: &[String]) -> Result<Vec<String>>;
}

/// Compute the table list to replicate.
///
/// `include` wins when non-empty (intersected with what `schema` holds);
/// otherwise every table of `schema` minus `exclude`.
pub async fn prepare_table_list(
    reverser: &dyn SchemaReverser,
    schema: &str,
    include: &[String],
    exclude: &[String],
) -> Result<Vec<String>> {
    if !reverser.schema_exists(schema).await? {
        anyhow::bail!("Schema '{schema}' does not exist");
    }
    let all_tables = reverser.list_tables(schema).await?;

    let tables = if !include.is_empty() {
        let tables = filter_intersection(&all_tables, include);
        let missing = filter_difference(include, &all_tables);
        if !missing.is_empty() {
            tracing::warn!(
                "Tables not found in schema {}: {:?}",
                schema,
                missing
            );
        }
        tables
    } else {
        filter_difference(&all_tables, exclude)
    };

    tracing::info!(
        "Prepared {} tables for schema {}",
        tables.len(),
        schema
    );
    Ok(tables)
}
