//! Diagnostics command.

use anyhow::Result;
use colored::Colorize;

use oneki_core::OnekiConfig;
use oneki_core::cache::{AwayCache, AwayScope, BlacklistCache, PrefixCache};
use oneki_core::config::StoreBackend;

pub async fn execute(config: &OnekiConfig) -> Result<()> {
    println!("{}", "oneki Doctor".cyan().bold());
    println!("{}", "─".repeat(50));
    println!();

    let mut issues = Vec::new();

    // Check config file
    print!("  Config file: ");
    if config.config_path().exists() {
        println!("{}", "✓ exists".green());
    } else {
        println!("{}", "○ not found (using defaults)".yellow());
    }

    // Check translations
    print!("  Locales: ");
    match config.translations() {
        Ok(translations) => println!("{}", format!("✓ {}", translations.locales().join(", ")).green()),
        Err(e) => {
            println!("{}", format!("✗ {}", e).red());
            issues.push("Locale catalogs are invalid");
        }
    }

    // Check store
    match config.store.backend {
        StoreBackend::Sqlite => print!("  Store (sqlite:{}): ", config.database_path().display()),
        StoreBackend::Memory => print!("  Store (memory): "),
    }
    let store = match super::open_store(config).await {
        Ok(store) => {
            println!("{}", "✓ reachable".green());
            Some(store)
        }
        Err(e) => {
            println!("{}", format!("✗ {:#}", e).red());
            issues.push("Document store is not accessible");
            None
        }
    };

    // Check each scope loads
    if let Some(store) = store {
        println!();
        println!("  {}", "Scopes:".cyan());

        print!("    prefixes: ");
        match PrefixCache::load(
            store.clone(),
            config.prefixes.defaults.clone(),
            config.prefixes.direct_message.clone(),
        )
        .await
        {
            Ok(prefixes) => println!("{}", format!("✓ {} guilds", prefixes.scope().len().await).green()),
            Err(e) => {
                println!("{}", format!("✗ {}", e).red());
                issues.push("Prefixes failed to load");
            }
        }

        print!("    blacklist: ");
        match BlacklistCache::load(store.clone()).await {
            Ok(blacklist) => println!("{}", format!("✓ {} entries", blacklist.scope().len().await).green()),
            Err(e) => {
                println!("{}", format!("✗ {}", e).red());
                issues.push("Blacklist failed to load");
            }
        }

        print!("    away: ");
        match AwayCache::load(AwayScope, store).await {
            Ok(away) => println!("{}", format!("✓ {} users", away.len().await).green()),
            Err(e) => {
                println!("{}", format!("✗ {}", e).red());
                issues.push("Away records failed to load");
            }
        }
    }

    // Check report channel
    println!();
    print!("  Report channel: ");
    match config.sessions.report_channel {
        Some(channel) => println!("{}", format!("✓ {}", channel).green()),
        None => println!("{}", "○ not set (bug reports are only logged)".yellow()),
    }

    // Summary
    println!();
    if issues.is_empty() {
        println!("{}", "✓ All checks passed".green().bold());
    } else {
        println!("{}", format!("✗ {} issue(s) found:", issues.len()).red().bold());
        for issue in &issues {
            println!("  • {}", issue);
        }
    }

    Ok(())
}
