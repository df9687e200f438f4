//! Pre-sync table list preparation against the target.

use anyhow::Result;
use schema_reverser::{
    filter_difference, filter_intersection, prepare_table_list, MySQLReverser, SchemaReverser,
};

/// The source schema to check the target against.
pub struct SourceCheck<'a> {
    pub reverser: &'a dyn SchemaReverser,
    pub schema: &'a str,
}

/// Result of [`run_prepare`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrepareReport {
    pub tables: Vec<String>,
    /// Source tables with no counterpart in the target schema
    pub missing_on_target: Vec<String>,
    /// `(table, backup)` pairs renamed before a fresh load
    pub backups: Vec<(String, String)>,
}

/// Validate the target schema and compute the table list to sync.
///
/// With a `source`, its schema must exist too and the list becomes the
/// source tables that also exist on the target; the rest are reported in
/// [`PrepareReport::missing_on_target`]. Listed names are upper-cased;
/// `lowercase` renders them lower-case again for targets with
/// case-sensitive table names. With `backup`, every listed table is renamed
/// to `<table>_bak` so the full load starts from empty tables.
pub async fn run_prepare(
    reverser: &MySQLReverser,
    target_schema: &str,
    source: Option<SourceCheck<'_>>,
    include: &[String],
    exclude: &[String],
    lowercase: bool,
    backup: bool,
) -> Result<PrepareReport> {
    let target_tables = prepare_table_list(reverser, target_schema, include, exclude).await?;

    let (tables, missing_on_target) = match source {
        Some(source) => {
            let source_tables =
                prepare_table_list(source.reverser, source.schema, include, exclude).await?;
            let missing = filter_difference(&source_tables, &target_tables);
            if !missing.is_empty() {
                tracing::warn!(
                    "Source tables of {} missing from target schema {}: {:?}",
                    source.schema,
                    target_schema,
                    missing
                );
            }
            (filter_intersection(&source_tables, &target_tables), missing)
        }
        None => (target_tables, Vec::new()),
    };

    let tables: Vec<String> = tables
        .into_iter()
        .map(|t| if lowercase { t.to_lowercase() } else { t })
        .collect();

    let mut backups = Vec::new();
    if backup {
        for table in &tables {
            let renamed = reverser.rename_table_to_backup(target_schema, table).await?;
            backups.push((table.clone(), renamed));
        }
    }

    Ok(PrepareReport {
        tables,
        missing_on_target,
        backups,
    })
}
