//! Scoped read-through/write-through caches over the `StateStore`.
//!
//! One generic [`ScopedCache`] is instantiated per scope:
//!
//! ```text
//! prefixes   guilds/<guild_id>.prefixes        GuildId      -> [prefix]
//! blacklist  blacklist/{users,guilds}.<id>     target       -> reason?
//! away       users/afks.<user_id>              UserId       -> {reason, time}
//! ```
//!
//! ## Consistency
//!
//! - `load` materialises the whole scope once at startup; malformed entries
//!   are skipped with a warning.
//! - Reads never touch the store.
//! - `put` applies the value in memory, then persists it. A failed write
//!   restores the previous value before the error reaches the caller.
//! - `remove` fails with `NotPresent` for keys that are not cached, otherwise
//!   deletes from the store (idempotent) and then from memory.
//! - Mutations of one key are serialised by a per-key lock held across the
//!   store round trip; mutations of different keys never wait on each other.
//!   Scopes that keep many keys in one document rely on the store's atomic
//!   field merge, so interleaved writes to different keys all persist.

mod away;
mod blacklist;
mod locks;
mod prefixes;

pub use away::{AwayCache, AwayRecord, AwayScope};
pub use blacklist::{BlacklistCache, BlacklistScope, BlacklistTarget};
pub use prefixes::{Invocation, PrefixCache, PrefixScope};

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::store::{StateStore, StoreResult};
use locks::KeyLocks;

/// Binding between a cache scope and its documents in the store.
#[async_trait]
pub trait CacheScope: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Display + Send + Sync + 'static;
    type Value: Clone + Send + Sync + 'static;

    /// Scope name used in logs and errors
    fn name(&self) -> &'static str;

    /// Enumerate every entry of the scope. Malformed entries are skipped.
    async fn load(&self, store: &dyn StateStore) -> StoreResult<HashMap<Self::Key, Self::Value>>;

    /// Write one entry.
    async fn persist(
        &self,
        store: &dyn StateStore,
        key: &Self::Key,
        value: &Self::Value,
    ) -> StoreResult<()>;

    /// Delete one entry. Must be idempotent.
    async fn erase(&self, store: &dyn StateStore, key: &Self::Key) -> StoreResult<()>;
}

/// In-memory view of one scope, kept consistent with the store.
pub struct ScopedCache<S: CacheScope> {
    scope: S,
    store: Arc<dyn StateStore>,
    entries: RwLock<HashMap<S::Key, S::Value>>,
    locks: KeyLocks<S::Key>,
}

impl<S: CacheScope> ScopedCache<S> {
    /// Materialise the scope from the store.
    pub async fn load(scope: S, store: Arc<dyn StateStore>) -> Result<Self> {
        let entries = scope.load(store.as_ref()).await?;
        info!(scope = scope.name(), entries = entries.len(), "Loaded cache scope");
        Ok(Self {
            scope,
            store,
            entries: RwLock::new(entries),
            locks: KeyLocks::new(),
        })
    }

    /// A cache with no entries, for stores known to be empty.
    pub fn empty(scope: S, store: Arc<dyn StateStore>) -> Self {
        Self {
            scope,
            store,
            entries: RwLock::new(HashMap::new()),
            locks: KeyLocks::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.scope.name()
    }

    /// Cached value for `key`
    pub async fn get(&self, key: &S::Key) -> Option<S::Value> {
        self.entries.read().await.get(key).cloned()
    }

    /// Cached value for `key`, or the caller's default
    pub async fn get_or(&self, key: &S::Key, default: S::Value) -> S::Value {
        self.get(key).await.unwrap_or(default)
    }

    pub async fn contains(&self, key: &S::Key) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Copy of every cached entry
    pub async fn snapshot(&self) -> Vec<(S::Key, S::Value)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Set `key` to `value`, returning the previous value.
    ///
    /// The value is visible to readers as soon as it is applied; if the store
    /// write fails it is rolled back and `Error::Persistence` is returned.
    pub async fn put(&self, key: S::Key, value: S::Value) -> Result<Option<S::Value>> {
        let _guard = self.locks.lock(&key).await;

        let previous = {
            let mut entries = self.entries.write().await;
            entries.insert(key.clone(), value.clone())
        };

        match self.scope.persist(self.store.as_ref(), &key, &value).await {
            Ok(()) => {
                debug!(scope = self.name(), key = %key, "Cache entry stored");
                Ok(previous)
            }
            Err(e) => {
                let mut entries = self.entries.write().await;
                match previous {
                    Some(old) => {
                        entries.insert(key.clone(), old);
                    }
                    None => {
                        entries.remove(&key);
                    }
                }
                warn!(
                    scope = self.name(),
                    key = %key,
                    error = %e,
                    "Cache write failed, rolled back"
                );
                Err(Error::persistence(self.name(), &key, e))
            }
        }
    }

    /// Remove `key`, returning the removed value.
    ///
    /// Fails with `Error::NotPresent` when the key is not cached. The store
    /// deletion happens first; the entry stays cached if it fails.
    pub async fn remove(&self, key: &S::Key) -> Result<S::Value> {
        let _guard = self.locks.lock(key).await;

        if !self.contains(key).await {
            return Err(Error::not_present(self.name(), key));
        }

        if let Err(e) = self.scope.erase(self.store.as_ref(), key).await {
            warn!(scope = self.name(), key = %key, error = %e, "Cache delete failed");
            return Err(Error::persistence(self.name(), key, e));
        }

        let removed = self.entries.write().await.remove(key);
        debug!(scope = self.name(), key = %key, "Cache entry removed");
        removed.ok_or_else(|| Error::not_present(self.name(), key))
    }
}
