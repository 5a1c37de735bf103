//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod export;
mod ingest;
mod status;
mod transform;

use clap::{Parser, Subcommand};

use transitlake::config::{ExportArgs, IngestArgs, StatusArgs, TransformArgs};

#[derive(Parser)]
#[command(name = "transitlake")]
#[command(about = "Bronze/silver/gold batch pipeline for transit vehicle telemetry")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch current vehicle activity and append it to bronze as one load
    Ingest(IngestArgs),

    /// Merge bronze loads newer than the silver checkpoint into silver
    Transform(TransformArgs),

    /// Merge the silver table into gold (update matching keys, insert new ones)
    Export(ExportArgs),

    /// Show silver checkpoint history and row count
    Status(StatusArgs),
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest(args) => ingest::cmd_ingest(args.resolve()?).await,
        Commands::Transform(args) => transform::cmd_transform(args.resolve()?).await,
        Commands::Export(args) => export::cmd_export(args.resolve()?).await,
        Commands::Status(args) => status::cmd_status(&args.resolve()?),
    }
}
