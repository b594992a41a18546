//! oneki - Oneki operator CLI
//!
//! Inspects and edits the cached scopes (prefixes, blacklist, away) directly
//! in the document store, going through the same cache contract as the bot.

use anyhow::Result;
use clap::Parser;
use oneki_core::OnekiConfig;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("oneki=warn".parse()?))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.home {
        Some(home) => OnekiConfig::load_from(home)?,
        None => OnekiConfig::load()?,
    };

    // Execute command
    match cli.command {
        Commands::Prefix(cmd) => commands::prefix::execute(cmd, &config).await,
        Commands::Blacklist(cmd) => commands::blacklist::execute(cmd, &config).await,
        Commands::Away(cmd) => commands::away::execute(cmd, &config).await,
        Commands::Doctor => commands::doctor::execute(&config).await,
        Commands::Version => {
            println!("oneki {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
