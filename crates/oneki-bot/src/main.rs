//! oneki-bot - Oneki bot process
//!
//! Loads the caches, then routes messages and component presses from the
//! console transport until EOF or ctrl-c.

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use oneki_core::OnekiConfig;

mod console;
mod router;
mod state;

use console::{Console, ConsoleHost};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't interleave with console output
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive("oneki_bot=info".parse()?)
                .add_directive("oneki_core=info".parse()?),
        )
        .init();

    info!("oneki-bot v{}", env!("CARGO_PKG_VERSION"));

    let config = OnekiConfig::load()?;
    info!("Config loaded from {:?}", config.config_path());

    let translations = Arc::new(config.translations()?.strict(false));
    info!(locales = ?translations.locales(), "Translations loaded");

    let store = config.open_store()?;
    let host = Arc::new(ConsoleHost::stdout());
    let state = AppState::load(config, store, host.clone(), translations).await?;

    info!("Bot ready, reading messages from stdin");
    let console = Console::new(Arc::clone(&state), host)?;
    console.run().await?;

    info!("Shutting down...");
    state.sessions.shutdown().await;

    Ok(())
}
