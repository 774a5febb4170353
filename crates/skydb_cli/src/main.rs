//! SkyDB CLI
//!
//! Command-line tools for SkyDB data files.
//!
//! # Commands
//!
//! - `init` - Create an empty data file
//! - `inspect` - Display block statistics and ranges
//! - `add-event` - Insert one event
//! - `verify` - Check block layout integrity

mod commands;

use clap::{Parser, Subcommand};
use skydb_core::DEFAULT_BLOCK_SIZE;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SkyDB command-line data file tools.
#[derive(Parser)]
#[command(name = "skydb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Block size the file was created with
    #[arg(global = true, short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty data file
    Init,

    /// Display block statistics and ranges
    Inspect {
        /// Show one line per block
        #[arg(long)]
        blocks: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Insert one event
    AddEvent {
        /// Object the event belongs to
        #[arg(short, long)]
        object_id: u64,

        /// Event timestamp
        #[arg(short, long, allow_hyphen_values = true)]
        timestamp: i64,

        /// Action identifier
        #[arg(short, long, default_value = "0")]
        action: u16,

        /// Event payload
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Check block layout integrity
    Verify,

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
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Init => {
            let path = cli.path.ok_or("Data file path required for init")?;
            commands::init::run(&path, cli.block_size)?;
        }
        Commands::Inspect { blocks, format } => {
            let path = cli.path.ok_or("Data file path required for inspect")?;
            commands::inspect::run(&path, cli.block_size, blocks, &format)?;
        }
        Commands::AddEvent {
            object_id,
            timestamp,
            action,
            data,
        } => {
            let path = cli.path.ok_or("Data file path required for add-event")?;
            let mut event = skydb_core::Event::new(object_id, timestamp).with_action(action);
            if let Some(data) = data {
                event = event.with_data(data.into_bytes());
            }
            commands::add_event::run(&path, cli.block_size, &event)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Data file path required for verify")?;
            commands::verify::run(&path, cli.block_size)?;
        }
        Commands::Version => {
            println!("SkyDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("SkyDB Core v{}", skydb_core::VERSION);
        }
    }

    Ok(())
}
