//! StashDB CLI
//!
//! Maintenance tools for StashDB storage directories.
//!
//! # Commands
//!
//! - `inspect` - Show collections, record counts and pending operations
//! - `pending` - List interrupted operations left in the redo log
//! - `verify` - Check record files and shadow files
//! - `recover` - Replay interrupted operations

mod commands;
mod error;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// StashDB command-line maintenance tools.
#[derive(Parser)]
#[command(name = "stashdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the storage directory
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
    /// Show collections, record counts and pending operations
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List interrupted operations left in the redo log
    Pending {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check record files, shadow files and the redo log
    Verify,

    /// Replay interrupted operations
    Recover {
        /// Only list what would be replayed
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Storage path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Pending { format } => {
            let path = cli.path.ok_or("Storage path required for pending")?;
            commands::pending::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Storage path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Recover { dry_run } => {
            let path = cli.path.ok_or("Storage path required for recover")?;
            if dry_run {
                commands::pending::run(&path, "text")?;
            } else {
                commands::recover::run(&path)?;
            }
        }
        Commands::Version => {
            println!("StashDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("StashDB Core v{}", stashdb_core::VERSION);
        }
    }

    Ok(())
}
