//! quince database inspector.
//!
//! Provides the `quince` binary for looking inside a database written by
//! quince-storage without declaring any schemas: list tables, print a
//! table's DDL, or dump its rows as JSON lines.

use std::process;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use quince_storage::{Store, StoreConfig, StoreError};

/// Inspect quince databases.
#[derive(Parser)]
#[command(name = "quince", about = "Inspect quince databases")]
struct Cli {
    /// Path to the database file (default: QUINCE_DB_PATH).
    #[arg(short, long)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// List tables with their row counts.
    Tables,

    /// Print the CREATE TABLE statement of a table.
    Schema {
        /// Table name.
        table: String,
    },

    /// Print rows of a table as JSON, one per line.
    Dump {
        /// Table name.
        table: String,

        /// Maximum number of rows to print.
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), StoreError> {
    let mut config = StoreConfig::from_env()?;
    if let Some(db) = cli.db {
        config.path = db;
    }
    debug!(path = %config.path, "opening database");
    let store = Store::open(&config)?;

    match cli.command {
        Commands::Tables => {
            for table in store.catalog()? {
                println!("{}\t{}", table.name, table.rows);
            }
        }
        Commands::Schema { table } => {
            println!("{}", store.table_sql(&table)?);
        }
        Commands::Dump { table, limit } => {
            for row in store.dump_table(&table, limit)? {
                let line = serde_json::to_string(&row).unwrap_or_else(|e| {
                    format!("{{\"error\": \"failed to serialize row: {}\"}}", e)
                });
                println!("{}", line);
            }
        }
    }

    store.close()
}
