//! Core types for the transfer-sync replication framework.
//!
//! This crate provides the foundational types shared by every other crate
//! in the workspace:
//!
//! - [`ChangeRecord`] - One parsed source row mutation mined from the redo stream
//! - [`ApplyPayload`] - One unit of work submitted to an apply worker
//! - [`ApplyResult`] - Outcome of executing one payload
//! - [`ReplicationMarker`] - The (global, table) SCN pair used for checkpointing
//! - [`ExecutionGateway`] - "Run this SQL, give me string rows back"
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── checkpoint        (per-table replication position)
//!    ├─── mysql-target      (ExecutionGateway over mysql_async)
//!    ├─── schema-reverser   (metadata checks before sync)
//!    └─── redo-apply        (translator, pipelines, scheduler, full load)
//! ```

pub mod change;
pub mod gateway;
pub mod marker;
pub mod payload;
pub mod sql;

pub use change::{ChangeRecord, OperationKind, ParseOperationError, RedoContent, RowImage};
pub use gateway::{ExecutionGateway, QueryOutput};
pub use marker::ReplicationMarker;
pub use payload::{ApplyFailureKind, ApplyPayload, ApplyResult};
