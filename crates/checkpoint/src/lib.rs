//! Per-table checkpoint management for transfer-sync
//!
//! Records, for every replicated source table, the last replication marker
//! whose changes have been committed on the target. Incremental sync resumes
//! from these markers after a restart.
//!
//! # Architecture
//!
//! This crate provides:
//! - The `CheckpointStore` trait: read, advance and list table checkpoints
//! - `CheckpointStorage` configuration and `open_store` to build a backend
//!
//! ## Storage Backends
//!
//! - `MemoryStore` - Keeps checkpoints in process memory (tests, dry runs)
//! - `FilesystemStore` - One JSON file per table
//! - `GatewayStore` - A meta table on the target database
//!
//! Every backend only moves a table's marker forward. An advance to a marker
//! at or behind the stored one is discarded, so workers finishing out of
//! order can never regress a checkpoint.
//!
//! Delivery is at-least-once: the checkpoint is written after the target
//! commit, so a crash between the two replays the payload on restart.

mod config;
mod filesystem;
mod gateway;
mod memory;
pub mod store;


// Re-export config types
pub use config::{open_store, CheckpointStorage};

// Re-export store trait and types
pub use store::{CheckpointKey, CheckpointStore, TableCheckpoint};

// Re-export storage implementations
pub use filesystem::FilesystemStore;
pub use gateway::{GatewayStore, META_TABLE};
pub use memory::MemoryStore;
