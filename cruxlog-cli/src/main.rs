//! cruxlog CLI - climbing log API server
//!
//! Entry point for the `cruxlog` binary:
//! - `serve` runs the HTTP API over a pooled MySQL connection
//! - `check` verifies database credentials and TLS, then exits

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod tracing_setup;

use tracing_setup::{init_tracing, TracingConfig};

#[derive(Parser, Debug)]
#[command(
    name = "cruxlog",
    author,
    version,
    about = "Climbing log API server",
    long_about = "Serve users, climbs, tutorials and monthly difficulty averages over HTTP, \
                  backed by a pooled TLS connection to MySQL. Settings come from flags, \
                  environment variables or a .env file."
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(commands::serve::ServeArgs),

    /// Check database connectivity and exit
    Check(commands::check::CheckArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before clap reads env-backed flags
    let dotenv = config::load_dotenv();
    let cli = Cli::parse();

    init_tracing(&TracingConfig { debug: cli.debug })?;
    if let Some(path) = dotenv {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    match cli.command {
        Commands::Serve(args) => commands::run_serve(args).await,
        Commands::Check(args) => commands::run_check(args).await,
    }
}
