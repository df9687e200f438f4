//! MySQL/TiDB target access for transfer-sync
//!
//! Provides the [`MySQLGateway`], the `mysql_async` implementation of
//! [`sync_core::ExecutionGateway`] used by the apply workers, the checkpoint
//! meta table and the schema reverser.

mod client;
mod gateway;

pub use client::{new_mysql_pool, sanitize_connection_string};
pub use gateway::{value_to_string, MySQLGateway};
