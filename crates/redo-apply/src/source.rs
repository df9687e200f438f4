//! Captured log units.
//!
//! Redo mining happens outside this crate. A [`ChangeSource`] hands over
//! one mined log unit at a time, already parsed into change records.

use std::collections::{BTreeMap, VecDeque};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sync_core::ChangeRecord;

#[async_trait]
pub trait ChangeSource: Send {
    /// Next captured log unit in capture order, or `None` when exhausted.
    async fn next_log_unit(&mut self) -> Result<Option<Vec<ChangeRecord>>>;
}

/// Reads log units from JSON Lines files, one file per log unit and one
/// change record per line. Blank lines are skipped.
pub struct JsonlChangeSource {
    files: VecDeque<PathBuf>,
}

impl JsonlChangeSource {
    pub fn new(files: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            files: files.into_iter().collect(),
        }
    }

    fn read_file(path: &PathBuf) -> Result<Vec<ChangeRecord>> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open log unit {}", path.display()))?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        for (line_count, line) in reader.lines().enumerate() {
            let line = line?;
            let line_count = line_count + 1;
            if line.trim().is_empty() {
                continue;
            }
            let record: ChangeRecord = serde_json::from_str(&line).map_err(|e| {
                anyhow!(
                    "Error parsing change record at {}:{line_count}: {e}",
                    path.display()
                )
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

#[async_trait]
impl ChangeSource for JsonlChangeSource {
    async fn next_log_unit(&mut self) -> Result<Option<Vec<ChangeRecord>>> {
        let Some(path) = self.files.pop_front() else {
            return Ok(None);
        };
        let records = tokio::task::spawn_blocking(move || Self::read_file(&path))
            .await
            .context("Log unit reader task failed")??;
        tracing::debug!("Read log unit with {} change records", records.len());
        Ok(Some(records))
    }
}

/// Group a log unit by upper-cased source table name, keeping record order
/// within each table.
///
/// Only records of `schema` (compared case-insensitively) are kept; a mined
/// unit can carry same-named tables of other schemas. Every table in
/// `tables` gets an entry, empty when nothing was captured for it. When
/// `tables` is non-empty, records of other tables are dropped with a
/// warning.
pub fn group_by_table(
    records: Vec<ChangeRecord>,
    schema: &str,
    tables: &[String],
) -> BTreeMap<String, Vec<ChangeRecord>> {
    let mut grouped: BTreeMap<String, Vec<ChangeRecord>> = tables
        .iter()
        .map(|t| (t.to_uppercase(), Vec::new()))
        .collect();

    let mut foreign: BTreeMap<String, usize> = BTreeMap::new();
    let mut dropped: BTreeMap<String, usize> = BTreeMap::new();
    for record in records {
        if !record.source_schema.eq_ignore_ascii_case(schema) {
            *foreign.entry(record.qualified_table()).or_default() += 1;
            continue;
        }
        let table = record.source_table.to_uppercase();
        match grouped.get_mut(&table) {
            Some(batch) => batch.push(record),
            None if tables.is_empty() => grouped.entry(table).or_default().push(record),
            None => *dropped.entry(table).or_default() += 1,
        }
    }

    for (table, count) in foreign {
        tracing::warn!(
            "Dropped {} change records of {} outside source schema {}",
            count,
            table,
            schema
        );
    }
    for (table, count) in dropped {
        tracing::warn!(
            "Dropped {} change records of table {} not in the sync table list",
            count,
            table
        );
    }
    grouped
}
