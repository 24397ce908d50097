//! textsync CLI
//!
//! Command-line tools for textsync.
//!
//! # Commands
//!
//! - `simulate` - Run several sync sessions against an in-process authority
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::simulate::SimulateOptions;

/// textsync command-line tools.
#[derive(Parser)]
#[command(name = "textsync")]
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
    /// Run concurrent editing sessions and check that they converge
    Simulate {
        /// Number of clients
        #[arg(short, long, default_value = "3")]
        clients: usize,

        /// Random edits per client
        #[arg(short, long, default_value = "20")]
        edits: usize,

        /// Seed for edits and network delays
        #[arg(short, long, default_value = "0")]
        seed: u64,

        /// Upper bound of the simulated delay per message, in milliseconds
        #[arg(short, long, default_value = "20")]
        max_delay_ms: u64,
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
        Commands::Simulate {
            clients,
            edits,
            seed,
            max_delay_ms,
        } => {
            if clients == 0 {
                return Err("at least one client is required".into());
            }
            commands::simulate::run(&SimulateOptions {
                clients,
                edits,
                seed,
                max_delay_ms,
            })?;
        }
        Commands::Version => {
            println!("textsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("textsync protocol v{}", textsync_protocol::VERSION);
        }
    }

    Ok(())
}
