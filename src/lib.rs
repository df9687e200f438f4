//! transfer-sync library
//!
//! Keeps a MySQL/TiDB target in step with an Oracle source: a one-off full
//! load of bulk-insert statements per table, then incremental apply of the
//! change records mined from the source redo stream, with per-table
//! checkpoints so a restart resumes where it left off.
//!
//! # CLI Usage
//!
//! ```bash
//! # Bulk-load one table
//! transfer-sync full --config transfer.yaml --table orders --statements orders.sql
//!
//! # Apply captured log units in order
//! transfer-sync incremental --config transfer.yaml --log-unit unit-001.jsonl unit-002.jsonl
//!
//! # Inspect stored checkpoints
//! transfer-sync checkpoint show --config transfer.yaml
//! ```

pub mod config;
pub mod full;
pub mod incremental;
pub mod prepare;

use std::sync::Arc;

use anyhow::Result;
use mysql_target::{new_mysql_pool, sanitize_connection_string, MySQLGateway};
use sync_core::ExecutionGateway;

pub use config::Config;

/// Open the pooled gateway to the configured target.
pub fn connect_target(config: &Config) -> Result<Arc<dyn ExecutionGateway>> {
    let max_connections = config.max_connections();
    let pool = new_mysql_pool(&config.target.uri, max_connections)?;
    tracing::info!(
        "Target: {} (schema {}, up to {} connections)",
        sanitize_connection_string(&config.target.uri),
        config.target.schema,
        max_connections
    );
    Ok(Arc::new(MySQLGateway::new(pool)))
}
