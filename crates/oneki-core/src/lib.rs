//! oneki-core - Core library for the Oneki chat bot
//!
//! This crate provides the stateful subsystem shared by the bot process and
//! the operator CLI:
//!
//! - **i18n**: Locale catalogs and the translation resolver
//! - **store**: The `StateStore` document contract (in-memory and SQLite)
//! - **host**: The `SessionHost` transport contract
//! - **session**: Interactive component sessions (guard, state machine, runtime)
//! - **cache**: Read-through/write-through scoped caches (prefixes, blacklist, away)
//! - **away**: The away-status monitor
//! - **config**: `config.toml` shared by the bot and the CLI

pub mod away;
pub mod cache;
pub mod config;
pub mod error;
pub mod host;
pub mod i18n;
pub mod session;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::OnekiConfig;
pub use error::{Error, Result};
pub use host::SessionHost;
pub use i18n::Translations;
pub use store::StateStore;
