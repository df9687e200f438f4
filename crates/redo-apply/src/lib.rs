//! Incremental redo apply for transfer-sync
//!
//! Turns change records mined from the source redo stream into statements
//! for the MySQL/TiDB target, applies them concurrently and checkpoints
//! per-table progress. Also hosts the bounded bulk applier used by the
//! initial full load.
//!
//! # Architecture
//!
//! ```text
//! ChangeSource ──► group_by_table ──► apply_log_unit (≤ apply_threads tables at once)
//!                                         │
//!                                         ▼ one per table
//!                                 run_table_pipeline
//!                  Translator ──► [bounded queue] ──► N workers ──► results ──► collector
//!                                                       │
//!                                     ExecutionGateway ─┴─► CheckpointStore::advance
//! ```
//!
//! # Ordering
//!
//! Statements of one payload commit together. Payloads of the same table
//! keep their order only with `worker_threads = 1`; with more workers they
//! may commit out of order. A table's checkpoint then only moves up to the
//! newest payload with no uncommitted or failed payload before it, and the
//! checkpoint store discards any advance that would move a table backward. Transaction coalescing folds the
//! records of one source transaction into a single payload so that a
//! transaction is never split across workers.
//!
//! # Delivery
//!
//! At-least-once: the checkpoint is written after the target commit and
//! before the result is reported. On restart, records at or behind a table's
//! stored marker are skipped and everything after it is applied again.

mod config;
mod context;
mod error;
mod full_load;
mod pipeline;
mod scheduler;
mod source;
mod translator;

pub use config::ApplyConfig;
pub use context::ApplyContext;
pub use error::{ApplyError, FailedPayload, TableFailure};
pub use full_load::{apply_full_load, FullLoadReport};
pub use pipeline::{run_table_pipeline, PipelineReport};
pub use scheduler::{apply_log_unit, CycleReport};
pub use source::{group_by_table, ChangeSource, JsonlChangeSource};
pub use translator::{Payloads, Translator};
