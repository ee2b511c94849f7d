//! BucketSQL CLI
//!
//! Command-line tools for BucketSQL database files.
//!
//! # Commands
//!
//! - `inspect` - List the bucket catalog with entry counts
//! - `verify` - Check the catalog against the tables that exist
//! - `dump` - Print the entries of one bucket
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// BucketSQL command-line database tools.
#[derive(Parser)]
#[command(name = "bucketsql")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every bucket with its table, sequence and entry count
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify that the catalog and the tables agree
    Verify,

    /// Dump the entries of one bucket
    Dump {
        /// Bucket path, outermost segment first
        #[arg(required = true)]
        segments: Vec<String>,

        /// Treat segments as hex instead of UTF-8
        #[arg(long)]
        hex: bool,

        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

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
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Database path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Dump {
            segments,
            hex,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Database path required for dump")?;
            let segments = commands::parse_segments(&segments, hex)?;
            commands::dump::run(&path, &segments, limit, &format)?;
        }
        Commands::Version => {
            println!("BucketSQL CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("BucketSQL Core v{}", bucketsql_core::VERSION);
        }
    }

    Ok(())
}
