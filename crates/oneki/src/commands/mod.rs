//! Command implementations for the oneki CLI.
//!
//! Each submodule implements the logic for a command group.

pub mod away;
pub mod blacklist;
pub mod doctor;
pub mod prefix;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

use oneki_core::OnekiConfig;
use oneki_core::store::StateStore;

/// Open the configured store and check that it answers.
pub(crate) async fn open_store(config: &OnekiConfig) -> Result<Arc<dyn StateStore>> {
    debug!(backend = ?config.store.backend, path = %config.database_path().display(), "Opening store");
    let store = config.open_store()?;
    store
        .ping()
        .await
        .context("document store is unreachable")?;
    Ok(store)
}
