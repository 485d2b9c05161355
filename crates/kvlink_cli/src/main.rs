//! kvlink CLI
//!
//! Command-line tools for kvlink databases.
//!
//! # Commands
//!
//! - `create-table` - Create a table
//! - `put` / `get` / `delete` - Single-record access
//! - `scan` - List the records of a table in key order
//! - `drop` - Drop a table or index
//! - `compact` - Reclaim space held by old versions
//! - `checkpoint` - Force a checkpoint
//! - `stats` - Print engine statistics

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// kvlink command-line database tools.
#[derive(Parser)]
#[command(name = "kvlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database home directory
    #[arg(global = true, long)]
    home: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a table
    CreateTable {
        /// Table name
        name: String,

        /// Table configuration, e.g. "key_format=S,value_format=S"
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Store a record
    Put {
        /// Table name
        table: String,
        /// Record key
        key: String,
        /// Record value
        value: String,

        /// Replace an existing value instead of failing
        #[arg(short, long)]
        overwrite: bool,
    },

    /// Print the value stored under a key
    Get {
        /// Table name
        table: String,
        /// Record key
        key: String,
    },

    /// Remove a record
    Delete {
        /// Table name
        table: String,
        /// Record key
        key: String,
    },

    /// List records in key order
    Scan {
        /// Table name
        table: String,

        /// Walk from the last key to the first
        #[arg(short, long)]
        reverse: bool,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Drop a table or index, e.g. "table:users"
    Drop {
        /// Object URI
        uri: String,

        /// Drop even if the object is in use
        #[arg(short, long)]
        force: bool,
    },

    /// Reclaim space held by old record versions
    Compact {
        /// Object URI, e.g. "table:users"
        uri: String,
    },

    /// Force a checkpoint
    Checkpoint {
        /// Checkpoint name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Print engine statistics
    Stats {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("kvlink CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let home = cli.home.ok_or("Database home required (--home <dir>)")?;
    match cli.command {
        Commands::CreateTable { name, config } => {
            commands::tables::create(&home, &name, config.as_deref())?;
        }
        Commands::Put {
            table,
            key,
            value,
            overwrite,
        } => {
            commands::records::put(&home, &table, &key, &value, overwrite)?;
        }
        Commands::Get { table, key } => {
            commands::records::get(&home, &table, &key)?;
        }
        Commands::Delete { table, key } => {
            commands::records::delete(&home, &table, &key)?;
        }
        Commands::Scan {
            table,
            reverse,
            limit,
            format,
        } => {
            commands::records::scan(&home, &table, reverse, limit, &format)?;
        }
        Commands::Drop { uri, force } => {
            commands::tables::drop(&home, &uri, force)?;
        }
        Commands::Compact { uri } => {
            commands::maintenance::compact(&home, &uri)?;
        }
        Commands::Checkpoint { name } => {
            commands::maintenance::checkpoint(&home, name)?;
        }
        Commands::Stats { format } => {
            commands::maintenance::stats(&home, &format)?;
        }
        Commands::Version => {}
    }

    Ok(())
}
