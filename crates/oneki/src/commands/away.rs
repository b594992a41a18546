//! Away record commands.

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;

use oneki_core::OnekiConfig;
use oneki_core::cache::{AwayCache, AwayScope};

use crate::cli::{AwayAction, AwayCommand};

pub async fn execute(cmd: AwayCommand, config: &OnekiConfig) -> Result<()> {
    let store = super::open_store(config).await?;
    let away = AwayCache::load(AwayScope, store).await?;

    match cmd.action {
        AwayAction::List => {
            let mut records = away.snapshot().await;
            if records.is_empty() {
                println!("{} Nobody is away", "○".yellow());
                return Ok(());
            }
            records.sort_by_key(|(_, record)| record.since);

            println!("{} {} users away:", "✓".green(), records.len());
            println!();
            let now = Utc::now();
            for (user, record) in records {
                let since = format!(
                    "since {} ({})",
                    record.since.format("%Y-%m-%d %H:%M UTC"),
                    ago(now - record.since)
                );
                println!("  {}  {}  {}", user.to_string().cyan(), record.reason, since.dimmed());
            }
        }
        AwayAction::Clear { user } => match away.remove(&user).await {
            Ok(record) => {
                println!("{} User {} is no longer away", "✓".green(), user);
                println!("  Reason was: {}", record.reason.dimmed());
            }
            Err(e) if e.is_not_present() => {
                println!("{} User {} is not away", "⚠".yellow(), user);
            }
            Err(e) => return Err(e.into()),
        },
    }

    Ok(())
}

/// Coarse human readable age
fn ago(elapsed: chrono::Duration) -> String {
    let minutes = elapsed.num_minutes().max(0);
    match minutes {
        0 => "just now".to_string(),
        1..=59 => format!("{minutes}m ago"),
        60..=1439 => format!("{}h ago", minutes / 60),
        _ => format!("{}d ago", minutes / 1440),
    }
}
