//! Execution gateway trait.
//!
//! Every component that talks to a database goes through this trait: the
//! apply workers, the checkpoint meta table and the schema reverser. The
//! implementation is expected to be safe for concurrent callers (backed by a
//! connection pool), acquiring a connection per call and releasing it on
//! every exit path.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

/// Column names plus rows rendered as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, String>>,
    pub affected_rows: u64,
}

impl QueryOutput {
    /// Values of one column across all rows, in row order.
    pub fn column_values(&self, column: &str) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| {
                row.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(column))
                    .map(|(_, v)| v.clone())
            })
            .collect()
    }

    /// First value of the first column, if any.
    pub fn scalar(&self) -> Option<&str> {
        let column = self.columns.first()?;
        self.rows.first()?.get(column).map(String::as_str)
    }
}

#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Run one statement and materialize its result as text.
    async fn execute(&self, statement: &str) -> Result<QueryOutput>;

    /// Run the statements as a single transaction: all commit or none do.
    /// Returns the total number of affected rows.
    async fn execute_batch(&self, statements: &[String]) -> Result<u64>;
}
