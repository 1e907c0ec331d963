//! helmsman — operator CLI for the Helmsman orchestrator.
//!
//! # Usage
//!
//! ```text
//! helmsman validate --config helmsman.toml
//! helmsman state --config helmsman.toml
//! helmsman plan --units 23 --batch-size 10 --error-tolerance 5
//! helmsman expand-weights '{"0ib":100,"0ig":0}'
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "helmsman",
    about = "Helmsman — blue/green deployment orchestrator",
    version,
    propagate_version = true
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a configuration file
    Validate {
        #[arg(short, long, default_value = "helmsman.toml")]
        config: PathBuf,
    },
    /// Print the persisted state of the configured deployment
    State {
        #[arg(short, long, default_value = "helmsman.toml")]
        config: PathBuf,
    },
    /// Preview how a fleet would be split into batches
    Plan {
        /// Number of units in the fleet.
        #[arg(long)]
        units: u32,
        /// Share of the fleet per batch (1-100).
        #[arg(long, default_value = "25")]
        batch_size: u32,
        /// Share of the fleet allowed to fail (0-100).
        #[arg(long, default_value = "0")]
        error_tolerance: u32,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Expand a flat weight map (`{"0ib":100,...}`) into stack/scope/slot form
    ExpandWeights {
        /// JSON object of identifier → weight.
        weights: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json)?;

    let output = match cli.command {
        Commands::Validate { config } => commands::config::validate(&config)?,
        Commands::State { config } => commands::config::state(&config)?,
        Commands::Plan {
            units,
            batch_size,
            error_tolerance,
            format,
        } => commands::plan::plan(units, batch_size, error_tolerance, &format)?,
        Commands::ExpandWeights { weights } => commands::weights::expand(&weights)?,
    };
    println!("{output}");
    Ok(())
}

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,helmsman=debug"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
