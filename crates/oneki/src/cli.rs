//! CLI argument definitions using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use oneki_core::cache::BlacklistTarget;
use oneki_core::types::{GuildId, UserId};

/// Oneki operator CLI
///
/// Edits the bot's prefixes, blacklist and away records in the document store.
#[derive(Parser, Debug)]
#[command(name = "oneki")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Oneki home directory (default: ~/.oneki)
    #[arg(long, global = true, env = "ONEKI_HOME")]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Guild command prefixes
    Prefix(PrefixCommand),

    /// Blacklisted users and guilds
    Blacklist(BlacklistCommand),

    /// Away records
    Away(AwayCommand),

    /// Run diagnostics
    Doctor,

    /// Show version
    Version,
}

// ─────────────────────────────────────────────────────────────────────────────
// Prefix Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct PrefixCommand {
    #[command(subcommand)]
    pub action: PrefixAction,
}

#[derive(Subcommand, Debug)]
pub enum PrefixAction {
    /// Show the prefixes of a guild
    Get {
        /// Guild ID
        guild: GuildId,
    },

    /// Replace the prefixes of a guild
    Set {
        /// Guild ID
        guild: GuildId,
        /// New prefixes
        #[arg(required = true)]
        prefixes: Vec<String>,
    },

    /// Drop a guild's custom prefixes
    Reset {
        /// Guild ID
        guild: GuildId,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Blacklist Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct BlacklistCommand {
    #[command(subcommand)]
    pub action: BlacklistAction,
}

#[derive(Subcommand, Debug)]
pub enum BlacklistAction {
    /// Blacklist a user or guild
    Add {
        /// user:<id> or guild:<id>
        target: BlacklistTarget,
        /// Why the target is blacklisted
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Lift a blacklist entry
    Remove {
        /// user:<id> or guild:<id>
        target: BlacklistTarget,
    },

    /// List blacklist entries
    List,
}

// ─────────────────────────────────────────────────────────────────────────────
// Away Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct AwayCommand {
    #[command(subcommand)]
    pub action: AwayAction,
}

#[derive(Subcommand, Debug)]
pub enum AwayAction {
    /// List users who are away
    List,

    /// Mark a user as present
    Clear {
        /// User ID
        user: UserId,
    },
}
