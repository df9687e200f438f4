//! Change records mined from the source redo stream.
//!
//! A [`ChangeRecord`] is immutable once captured. The redo miner that
//! produces them is an external collaborator; this crate only fixes the
//! shape the rest of the pipeline consumes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ReplicationMarker;

/// Column name -> text value. `None` is SQL NULL.
pub type RowImage = BTreeMap<String, Option<String>>;

/// Kind of row mutation carried by a change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    /// Upper-case name, as stored in the checkpoint meta table.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "INSERT",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation kind: {0}")]
pub struct ParseOperationError(pub String);

impl FromStr for OperationKind {
    type Err = ParseOperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Ok(OperationKind::Insert),
            "UPDATE" => Ok(OperationKind::Update),
            "DELETE" => Ok(OperationKind::Delete),
            _ => Err(ParseOperationError(s.to_string())),
        }
    }
}

/// What the redo miner captured for one mutation.
///
/// Either a statement already rendered for the target dialect, or the
/// before/after images of the row so the translator can render one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RedoContent {
    Statement {
        sql: String,
    },
    Row {
        #[serde(default)]
        before: Option<RowImage>,
        #[serde(default)]
        after: Option<RowImage>,
    },
}

/// One parsed source row mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub source_schema: String,
    pub source_table: String,
    pub operation: OperationKind,
    pub marker: ReplicationMarker,
    /// Source transaction id (XID). Consecutive records sharing one are
    /// folded into a single payload when coalescing is enabled.
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub content: RedoContent,
}

impl ChangeRecord {
    /// `SCHEMA.TABLE` identity used in logs and error messages.
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.source_schema, self.source_table)
    }

    /// Returns true when this record belongs to the given source table.
    /// Oracle identifiers are compared case-insensitively.
    pub fn belongs_to(&self, schema: &str, table: &str) -> bool {
        self.source_schema.eq_ignore_ascii_case(schema)
            && self.source_table.eq_ignore_ascii_case(table)
    }
}
