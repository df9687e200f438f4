//! Explicit context handed to every apply component.

use std::sync::Arc;

use checkpoint::CheckpointStore;
use sync_core::ExecutionGateway;

use crate::{ApplyConfig, Translator};

/// Everything a table pipeline needs. Cheap to clone; each table task gets
/// its own copy.
#[derive(Clone)]
pub struct ApplyContext {
    pub target_schema: String,
    pub gateway: Arc<dyn ExecutionGateway>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub config: ApplyConfig,
}

impl ApplyContext {
    pub fn new(
        target_schema: impl Into<String>,
        gateway: Arc<dyn ExecutionGateway>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: ApplyConfig,
    ) -> Self {
        Self {
            target_schema: target_schema.into(),
            gateway,
            checkpoints,
            config,
        }
    }

    pub fn translator(&self) -> Translator {
        Translator::new(&self.target_schema)
            .coalesce_transactions(self.config.coalesce_transactions)
            .lowercase_table_names(self.config.lowercase_table_names)
    }
}
