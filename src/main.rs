//! Command-line interface for transfer-sync
//!
//! # Usage Examples
//!
//! ## Full Load
//! ```bash
//! # Bulk-insert a dumped table with up to full.worker_threads statements in flight
//! transfer-sync full --config transfer.yaml --table orders --statements orders.sql
//! ```
//!
//! ## Incremental Apply
//! ```bash
//! # Apply captured log units in capture order, resuming from stored checkpoints
//! transfer-sync incremental --config transfer.yaml \
//!   --log-unit redo/unit-0001.jsonl redo/unit-0002.jsonl
//! ```
//!
//! ## Checkpoints
//! ```bash
//! transfer-sync checkpoint show --config transfer.yaml
//! ```
//!
//! ## Preparation
//! ```bash
//! # Validate the target schema and list the tables to sync
//! transfer-sync prepare --config transfer.yaml --exclude AUDIT_LOG
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use redo_apply::{ApplyContext, JsonlChangeSource};
use schema_reverser::MySQLReverser;
use transfer_sync::{connect_target, full, incremental, prepare, Config};

#[derive(Parser)]
#[command(name = "transfer-sync")]
#[command(about = "Full load and incremental redo apply from Oracle to MySQL/TiDB")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bulk-load one table from a file of INSERT statements
    Full {
        /// Configuration file
        #[arg(long, env = "TRANSFER_SYNC_CONFIG")]
        config: PathBuf,

        /// Target table name
        #[arg(long)]
        table: String,

        /// File of `;`-terminated statements, one per line
        #[arg(long, value_name = "PATH")]
        statements: PathBuf,
    },

    /// Apply captured log units (JSON Lines, one change record per line)
    Incremental {
        /// Configuration file
        #[arg(long, env = "TRANSFER_SYNC_CONFIG")]
        config: PathBuf,

        /// Log unit files, applied in the given order
        #[arg(long = "log-unit", value_name = "PATH", num_args = 1.., required = true)]
        log_units: Vec<PathBuf>,
    },

    /// Checkpoint inspection
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommand,
    },

    /// Validate the target schema and compute the table list to sync
    Prepare {
        /// Configuration file
        #[arg(long, env = "TRANSFER_SYNC_CONFIG")]
        config: PathBuf,

        /// Only these tables (repeatable)
        #[arg(long = "include", value_name = "TABLE")]
        include: Vec<String>,

        /// Every table except these (repeatable, ignored with --include)
        #[arg(long = "exclude", value_name = "TABLE")]
        exclude: Vec<String>,

        /// Rename each listed table to <table>_bak
        #[arg(long)]
        backup: bool,
    },
}

#[derive(Subcommand)]
enum CheckpointCommand {
    /// Print the stored checkpoint of every table
    Show {
        /// Configuration file
        #[arg(long, env = "TRANSFER_SYNC_CONFIG")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Full {
            config,
            table,
            statements,
        } => {
            let config = load_config(&config)?;
            let gateway = connect_target(&config)?;
            let report = full::run_full_load(&config, gateway, &table, &statements).await?;
            tracing::info!(
                "Full load of {}.{} completed: {} statements in {:?}",
                config.target.schema,
                table,
                report.statements,
                report.elapsed
            );
        }
        Commands::Incremental { config, log_units } => {
            let config = load_config(&config)?;
            let gateway = connect_target(&config)?;
            let store = checkpoint::open_store(&config.checkpoint, Some(gateway.clone())).await?;
            let ctx = ApplyContext::new(
                config.target.schema.clone(),
                gateway,
                store,
                config.apply.clone(),
            );
            let mut source = JsonlChangeSource::new(log_units);
            incremental::run_incremental(
                &ctx,
                &mut source,
                &config.source.schema,
                &config.source.tables,
            )
            .await?;
        }
        Commands::Checkpoint {
            command: CheckpointCommand::Show { config },
        } => {
            let config = load_config(&config)?;
            let gateway = match config.checkpoint {
                checkpoint::CheckpointStorage::Target { .. } => Some(connect_target(&config)?),
                _ => None,
            };
            let store = checkpoint::open_store(&config.checkpoint, gateway).await?;
            let checkpoints = store.list_checkpoints().await?;
            if checkpoints.is_empty() {
                println!("No checkpoints stored");
            }
            for cp in checkpoints {
                println!(
                    "{}.{}\t{}\t{}\t{}",
                    cp.source_schema,
                    cp.source_table,
                    cp.marker,
                    cp.operation,
                    cp.updated_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
                );
            }
        }
        Commands::Prepare {
            config,
            include,
            exclude,
            backup,
        } => {
            let config = load_config(&config)?;
            let reverser = MySQLReverser::new(connect_target(&config)?);
            // Redo mining runs outside this tool, so there is no source
            // connection to check against here.
            tracing::info!(
                "Checking target schema {} only, source schema {} is not consulted",
                config.target.schema,
                config.source.schema
            );
            let report = prepare::run_prepare(
                &reverser,
                &config.target.schema,
                None,
                &include,
                &exclude,
                config.apply.lowercase_table_names,
                backup,
            )
            .await?;
            for table in &report.tables {
                println!("{table}");
            }
            for (table, renamed) in &report.backups {
                tracing::info!("Renamed {} to {}", table, renamed);
            }
        }
    }

    Ok(())
}

fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    Config::from_file(path)
        .with_context(|| format!("Failed to load configuration from {path:?}"))
}
