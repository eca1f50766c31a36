//! PWA Commerce CLI - Local store and sync queue tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply local store migrations
//! pc-cli migrate
//!
//! # Inspect, deliver or drop the pending cart operations
//! pc-cli pending
//! pc-cli flush
//! pc-cli clear
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "pc-cli")]
#[command(author, version, about = "PWA Commerce CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply local store migrations
    Migrate,
    /// List cart operations awaiting delivery
    Pending,
    /// Deliver pending cart operations to the remote endpoint
    Flush,
    /// Drop every pending cart operation
    Clear,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await,
        Commands::Pending => commands::queue::pending().await,
        Commands::Flush => commands::queue::flush().await,
        Commands::Clear => commands::queue::clear().await,
    }
}
