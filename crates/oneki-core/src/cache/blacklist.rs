//! Globally blacklisted users and guilds.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use super::{CacheScope, ScopedCache};
use crate::error::Result;
use crate::store::{StateStore, StoreResult, upsert_field};
use crate::types::{GuildId, UserId};

const COLLECTION: &str = "blacklist";

/// Something that can be blacklisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlacklistTarget {
    User(UserId),
    Guild(GuildId),
}

impl BlacklistTarget {
    /// Document holding entries of this kind
    fn document(&self) -> &'static str {
        match self {
            Self::User(_) => "users",
            Self::Guild(_) => "guilds",
        }
    }

    fn id(&self) -> String {
        match self {
            Self::User(id) => id.to_string(),
            Self::Guild(id) => id.to_string(),
        }
    }
}

impl fmt::Display for BlacklistTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Guild(id) => write!(f, "guild:{id}"),
        }
    }
}

impl FromStr for BlacklistTarget {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("expected user:<id> or guild:<id>, got `{s}`"))?;
        let id: u64 = id.trim().parse().map_err(|e| format!("invalid id `{id}`: {e}"))?;
        match kind.trim() {
            "user" => Ok(Self::User(UserId(id))),
            "guild" => Ok(Self::Guild(GuildId(id))),
            other => Err(format!("unknown blacklist kind `{other}`")),
        }
    }
}

/// `blacklist/users.<id>` and `blacklist/guilds.<id>`, value = optional reason
pub struct BlacklistScope;

#[async_trait]
impl CacheScope for BlacklistScope {
    type Key = BlacklistTarget;
    type Value = Option<String>;

    fn name(&self) -> &'static str {
        "blacklist"
    }

    async fn load(
        &self,
        store: &dyn StateStore,
    ) -> StoreResult<HashMap<BlacklistTarget, Option<String>>> {
        let mut entries = HashMap::new();
        for document in ["users", "guilds"] {
            let Some(doc) = store.get(COLLECTION, document).await? else {
                continue;
            };
            for (id, reason) in doc {
                let Ok(id) = id.parse::<u64>() else {
                    warn!(document = document, id = %id, "Skipping malformed blacklist entry");
                    continue;
                };
                let target = match document {
                    "users" => BlacklistTarget::User(UserId(id)),
                    _ => BlacklistTarget::Guild(GuildId(id)),
                };
                let reason = match reason {
                    Value::String(reason) => Some(reason),
                    _ => None,
                };
                entries.insert(target, reason);
            }
        }
        Ok(entries)
    }

    async fn persist(
        &self,
        store: &dyn StateStore,
        key: &BlacklistTarget,
        value: &Option<String>,
    ) -> StoreResult<()> {
        let reason = value.clone().map(Value::String).unwrap_or(Value::Null);
        upsert_field(store, COLLECTION, key.document(), &key.id(), reason).await
    }

    async fn erase(&self, store: &dyn StateStore, key: &BlacklistTarget) -> StoreResult<()> {
        store.delete_field(COLLECTION, key.document(), &key.id()).await
    }
}

/// Blacklist membership.
pub struct BlacklistCache {
    cache: ScopedCache<BlacklistScope>,
}

impl BlacklistCache {
    pub async fn load(store: Arc<dyn StateStore>) -> Result<Self> {
        Ok(Self {
            cache: ScopedCache::load(BlacklistScope, store).await?,
        })
    }

    pub fn scope(&self) -> &ScopedCache<BlacklistScope> {
        &self.cache
    }

    pub async fn add(&self, target: BlacklistTarget, reason: Option<String>) -> Result<()> {
        self.cache.put(target, reason).await.map(|_| ())
    }

    /// Fails with `NotPresent` when the target is not blacklisted.
    pub async fn remove(&self, target: BlacklistTarget) -> Result<()> {
        self.cache.remove(&target).await.map(|_| ())
    }

    pub async fn contains(&self, target: BlacklistTarget) -> bool {
        self.cache.contains(&target).await
    }

    /// Whether a message from `user` in `guild` must be ignored.
    pub async fn is_blocked(&self, user: UserId, guild: Option<GuildId>) -> bool {
        if self.contains(BlacklistTarget::User(user)).await {
            return true;
        }
        match guild {
            Some(guild) => self.contains(BlacklistTarget::Guild(guild)).await,
            None => false,
        }
    }
}
