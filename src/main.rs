mod commands;
mod config;
mod ent;
mod gcal;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "entsync")]
#[command(about = "Sync a university ENT class schedule into Google Calendar")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate with Google Calendar
    Auth,
    /// Fetch the ENT schedule and reconcile the calendar
    Sync,
    /// Show what a sync would change, without applying it
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Auth => commands::auth::run().await,
        Commands::Sync => commands::sync::run().await,
        Commands::Status => commands::status::run().await,
    }
}
