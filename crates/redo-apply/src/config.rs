//! Concurrency settings for the incremental apply path.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Apply settings, read from the `apply` section of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
    /// Tables applied in parallel within one log unit
    pub apply_threads: usize,
    /// Workers per table pipeline. 1 keeps payloads in capture order.
    pub worker_threads: usize,
    /// Depth of each table's task queue
    pub worker_queue: usize,
    /// Fold consecutive records of one source transaction into one payload
    pub coalesce_transactions: bool,
    /// Lower-case target table names
    pub lowercase_table_names: bool,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            apply_threads: 4,
            worker_threads: 1,
            worker_queue: 64,
            coalesce_transactions: true,
            lowercase_table_names: false,
        }
    }
}

impl ApplyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.apply_threads == 0 {
            anyhow::bail!("apply.apply_threads must be at least 1");
        }
        if self.worker_threads == 0 {
            anyhow::bail!("apply.worker_threads must be at least 1");
        }
        if self.worker_queue == 0 {
            anyhow::bail!("apply.worker_queue must be at least 1");
        }
        if self.worker_threads > 1 {
            tracing::warn!(
                "apply.worker_threads = {}: payloads of the same table may commit out of capture order",
                self.worker_threads
            );
        }
        Ok(())
    }
}
