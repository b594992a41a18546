//! Blacklist commands.

use anyhow::Result;
use colored::Colorize;

use oneki_core::OnekiConfig;
use oneki_core::cache::BlacklistCache;

use crate::cli::{BlacklistAction, BlacklistCommand};

pub async fn execute(cmd: BlacklistCommand, config: &OnekiConfig) -> Result<()> {
    let store = super::open_store(config).await?;
    let blacklist = BlacklistCache::load(store).await?;

    match cmd.action {
        BlacklistAction::Add { target, reason } => {
            blacklist.add(target, reason.clone()).await?;
            println!("{} Blacklisted {}", "✓".green(), target.to_string().cyan());
            if let Some(reason) = reason {
                println!("  Reason: {}", reason);
            }
        }
        BlacklistAction::Remove { target } => match blacklist.remove(target).await {
            Ok(()) => println!("{} Removed {} from the blacklist", "✓".green(), target),
            Err(e) if e.is_not_present() => {
                println!("{} {} is not blacklisted", "⚠".yellow(), target);
            }
            Err(e) => return Err(e.into()),
        },
        BlacklistAction::List => {
            let mut entries = blacklist.scope().snapshot().await;
            if entries.is_empty() {
                println!("{} The blacklist is empty", "○".yellow());
                return Ok(());
            }
            entries.sort_by_key(|(target, _)| target.to_string());

            println!("{} {} blacklist entries:", "✓".green(), entries.len());
            println!();
            for (target, reason) in entries {
                let reason = reason.unwrap_or_else(|| "(no reason)".to_string());
                println!("  {}  {}", target.to_string().cyan(), reason.dimmed());
            }
        }
    }

    Ok(())
}
