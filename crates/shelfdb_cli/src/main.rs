//! ShelfDB CLI
//!
//! Command-line tools for ShelfDB database definitions.
//!
//! # Commands
//!
//! - `inspect` - Build a database from a definition file and describe it
//! - `dump` - Print records of a store or index
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use commands::dump::DumpOptions;
use shelfdb_core::Direction;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ShelfDB command-line database tools.
#[derive(Parser)]
#[command(name = "shelfdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a database from a definition file and describe it
    Inspect {
        /// Path to the JSON definition file
        definition: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print records of a store or index
    Dump {
        /// Path to the JSON definition file
        definition: PathBuf,

        /// Store to read
        #[arg(short, long)]
        store: String,

        /// Read through this index
        #[arg(short, long)]
        index: Option<String>,

        /// Lower bound, as JSON
        #[arg(long)]
        lower: Option<String>,

        /// Upper bound, as JSON
        #[arg(long)]
        upper: Option<String>,

        /// Exclude the lower bound
        #[arg(long)]
        lower_open: bool,

        /// Exclude the upper bound
        #[arg(long)]
        upper_open: bool,

        /// Cursor direction (next, nextunique, prev, prevunique)
        #[arg(short, long, default_value = "next")]
        direction: Direction,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print keys only
        #[arg(short, long)]
        keys_only: bool,

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
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { definition, format } => {
            commands::inspect::run(&definition, &format)?;
        }
        Commands::Dump {
            definition,
            store,
            index,
            lower,
            upper,
            lower_open,
            upper_open,
            direction,
            limit,
            keys_only,
            format,
        } => {
            let options = DumpOptions {
                store,
                index,
                lower,
                upper,
                lower_open,
                upper_open,
                direction,
                limit,
                keys_only,
            };
            commands::dump::run(&definition, &options, &format)?;
        }
        Commands::Version => {
            println!("ShelfDB CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
