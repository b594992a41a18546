//! Prefix commands.

use anyhow::Result;
use colored::Colorize;

use oneki_core::OnekiConfig;
use oneki_core::cache::PrefixCache;

use crate::cli::{PrefixAction, PrefixCommand};

pub async fn execute(cmd: PrefixCommand, config: &OnekiConfig) -> Result<()> {
    let store = super::open_store(config).await?;
    let prefixes = PrefixCache::load(
        store,
        config.prefixes.defaults.clone(),
        config.prefixes.direct_message.clone(),
    )
    .await?;

    match cmd.action {
        PrefixAction::Get { guild } => match prefixes.scope().get(&guild).await {
            Some(custom) => {
                println!("{} Guild {} prefixes: {}", "✓".green(), guild, custom.join(" ").cyan());
            }
            None => {
                println!(
                    "{} Guild {} uses the defaults: {}",
                    "○".yellow(),
                    guild,
                    prefixes.defaults().join(" ").dimmed()
                );
            }
        },
        PrefixAction::Set { guild, prefixes: list } => {
            let previous = prefixes.set(guild, list).await?;
            let current = prefixes.raw_prefixes(guild).await;
            println!("{} Guild {} prefixes: {}", "✓".green(), guild, current.join(" ").cyan());
            if let Some(previous) = previous {
                println!("  Was: {}", previous.join(" ").dimmed());
            }
        }
        PrefixAction::Reset { guild } => match prefixes.reset(guild).await {
            Ok(previous) => {
                println!(
                    "{} Guild {} reset to the defaults (was: {})",
                    "✓".green(),
                    guild,
                    previous.join(" ").dimmed()
                );
            }
            Err(e) if e.is_not_present() => {
                println!("{} Guild {} has no custom prefixes", "⚠".yellow(), guild);
            }
            Err(e) => return Err(e.into()),
        },
    }

    Ok(())
}
