//! Per-guild command prefixes.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::{CacheScope, ScopedCache};
use crate::error::{Result, ValidationFailure};
use crate::store::{StateStore, StoreResult, upsert_field};
use crate::types::{GuildId, UserId};

const COLLECTION: &str = "guilds";
const FIELD: &str = "prefixes";

/// Upper bound on custom prefixes per guild.
pub const MAX_PREFIXES: usize = 10;

/// `guilds/<guild_id>.prefixes`
pub struct PrefixScope;

#[async_trait]
impl CacheScope for PrefixScope {
    type Key = GuildId;
    type Value = Vec<String>;

    fn name(&self) -> &'static str {
        "prefixes"
    }

    async fn load(&self, store: &dyn StateStore) -> StoreResult<HashMap<GuildId, Vec<String>>> {
        let mut prefixes = HashMap::new();
        for id in store.list(COLLECTION).await? {
            let Ok(guild) = id.parse::<GuildId>() else {
                warn!(collection = COLLECTION, id = %id, "Skipping document with non-numeric id");
                continue;
            };
            let Some(doc) = store.get(COLLECTION, &id).await? else {
                continue;
            };
            let Some(value) = doc.get(FIELD) else {
                continue;
            };
            match serde_json::from_value::<Vec<String>>(value.clone()) {
                Ok(list) if !list.is_empty() => {
                    prefixes.insert(guild, list);
                }
                Ok(_) => {}
                Err(e) => warn!(guild = %guild, error = %e, "Skipping malformed prefix list"),
            }
        }
        Ok(prefixes)
    }

    async fn persist(
        &self,
        store: &dyn StateStore,
        key: &GuildId,
        value: &Vec<String>,
    ) -> StoreResult<()> {
        let list = Value::Array(value.iter().cloned().map(Value::String).collect());
        upsert_field(store, COLLECTION, &key.to_string(), FIELD, list).await
    }

    async fn erase(&self, store: &dyn StateStore, key: &GuildId) -> StoreResult<()> {
        store.delete_field(COLLECTION, &key.to_string(), FIELD).await
    }
}

/// Prefix cache with the configured fallbacks.
pub struct PrefixCache {
    cache: ScopedCache<PrefixScope>,
    defaults: Vec<String>,
    direct_message: Vec<String>,
}

impl PrefixCache {
    pub async fn load(
        store: Arc<dyn StateStore>,
        defaults: Vec<String>,
        direct_message: Vec<String>,
    ) -> Result<Self> {
        Ok(Self {
            cache: ScopedCache::load(PrefixScope, store).await?,
            defaults,
            direct_message,
        })
    }

    pub fn scope(&self) -> &ScopedCache<PrefixScope> {
        &self.cache
    }

    pub fn defaults(&self) -> &[String] {
        &self.defaults
    }

    /// Custom prefixes of a guild, or the configured defaults.
    pub async fn raw_prefixes(&self, guild: GuildId) -> Vec<String> {
        self.cache.get_or(&guild, self.defaults.clone()).await
    }

    /// Every prefix a command may start with in this context.
    ///
    /// Mention prefixes come first, then the DM defaults or the guild's list.
    pub async fn command_prefixes(&self, guild: Option<GuildId>, bot: UserId) -> Vec<String> {
        let mut prefixes = vec![format!("<@!{bot}> "), format!("<@{bot}> ")];
        match guild {
            Some(guild) => prefixes.extend(self.raw_prefixes(guild).await),
            None => prefixes.extend(self.direct_message.iter().cloned()),
        }
        prefixes
    }

    /// Replace a guild's custom prefixes.
    pub async fn set(&self, guild: GuildId, prefixes: Vec<String>) -> Result<Option<Vec<String>>> {
        let prefixes = validate_prefixes(prefixes)?;
        self.cache.put(guild, prefixes).await
    }

    /// Drop a guild's custom prefixes, falling back to the defaults.
    pub async fn reset(&self, guild: GuildId) -> Result<Vec<String>> {
        self.cache.remove(&guild).await
    }
}

fn validate_prefixes(prefixes: Vec<String>) -> std::result::Result<Vec<String>, ValidationFailure> {
    let mut cleaned: Vec<String> = Vec::with_capacity(prefixes.len());
    for prefix in prefixes {
        if prefix.trim().is_empty() {
            return Err(ValidationFailure::Empty);
        }
        if !cleaned.contains(&prefix) {
            cleaned.push(prefix);
        }
    }
    if cleaned.is_empty() {
        return Err(ValidationFailure::Empty);
    }
    if cleaned.len() > MAX_PREFIXES {
        return Err(ValidationFailure::TooMany { max: MAX_PREFIXES });
    }
    Ok(cleaned)
}

/// A message split into prefix, command name and argument text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation<'a> {
    pub prefix: &'a str,
    pub name: &'a str,
    pub args: &'a str,
}

impl<'a> Invocation<'a> {
    /// Match `content` against the longest applicable prefix.
    pub fn parse(content: &'a str, prefixes: &'a [String]) -> Option<Self> {
        let prefix = prefixes
            .iter()
            .filter(|prefix| content.starts_with(prefix.as_str()))
            .max_by_key(|prefix| prefix.len())?;

        let rest = content[prefix.len()..].trim_start();
        let (name, args) = match rest.find(char::is_whitespace) {
            Some(index) => (&rest[..index], rest[index..].trim()),
            None => (rest, ""),
        };
        if name.is_empty() {
            return None;
        }
        Some(Self {
            prefix: prefix.as_str(),
            name,
            args,
        })
    }

    pub fn is(&self, command: &str) -> bool {
        self.name.eq_ignore_ascii_case(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Document, MemoryStateStore};
    use serde_json::json;

    fn defaults() -> Vec<String> {
        vec!["?".to_string(), ">".to_string()]
    }

    async fn prefix_cache(store: Arc<MemoryStateStore>) -> PrefixCache {
        PrefixCache::load(store, defaults(), defaults()).await.unwrap()
    }

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_load_reads_guild_documents() {
        let store = Arc::new(MemoryStateStore::with_documents([
            ("guilds".to_string(), "1".to_string(), doc(json!({"prefixes": ["!"]}))),
            ("guilds".to_string(), "2".to_string(), doc(json!({"prefixes": "oops"}))),
            ("guilds".to_string(), "3".to_string(), doc(json!({"lang": "es"}))),
            ("guilds".to_string(), "abc".to_string(), doc(json!({"prefixes": ["x"]}))),
        ]));
        let cache = prefix_cache(store).await;

        assert_eq!(cache.scope().len().await, 1);
        assert_eq!(cache.raw_prefixes(GuildId(1)).await, vec!["!"]);
        assert_eq!(cache.raw_prefixes(GuildId(2)).await, defaults());
    }

    #[tokio::test]
    async fn test_set_merges_into_guild_document() {
        let store = Arc::new(MemoryStateStore::with_documents([(
            "guilds".to_string(),
            "5".to_string(),
            doc(json!({"lang": "es"})),
        )]));
        let cache = prefix_cache(Arc::clone(&store)).await;

        cache.set(GuildId(5), vec!["!".into(), "!".into(), "$".into()]).await.unwrap();

        let stored = store.get("guilds", "5").await.unwrap().unwrap();
        assert_eq!(stored["prefixes"], json!(["!", "$"]));
        assert_eq!(stored["lang"], "es");
    }

    #[tokio::test]
    async fn test_set_rejects_invalid_lists() {
        let cache = prefix_cache(Arc::new(MemoryStateStore::new())).await;

        let err = cache.set(GuildId(1), vec![]).await.unwrap_err();
        assert!(matches!(err, crate::Error::Validation(ValidationFailure::Empty)));

        let err = cache.set(GuildId(1), vec![" ".into()]).await.unwrap_err();
        assert!(matches!(err, crate::Error::Validation(ValidationFailure::Empty)));

        let many = (0..=MAX_PREFIXES).map(|i| format!("p{i}")).collect();
        let err = cache.set(GuildId(1), many).await.unwrap_err();
        assert!(matches!(err, crate::Error::Validation(ValidationFailure::TooMany { .. })));
        assert!(!cache.scope().contains(&GuildId(1)).await);
    }

    #[tokio::test]
    async fn test_reset_falls_back_to_defaults() {
        let store = Arc::new(MemoryStateStore::new());
        let cache = prefix_cache(Arc::clone(&store)).await;
        cache.set(GuildId(9), vec!["!".into()]).await.unwrap();

        let removed = cache.reset(GuildId(9)).await.unwrap();
        assert_eq!(removed, vec!["!"]);
        assert_eq!(cache.raw_prefixes(GuildId(9)).await, defaults());
        assert!(cache.reset(GuildId(9)).await.unwrap_err().is_not_present());
    }

    #[tokio::test]
    async fn test_command_prefixes() {
        let cache = PrefixCache::load(
            Arc::new(MemoryStateStore::new()),
            defaults(),
            vec!["".to_string()],
        )
        .await
        .unwrap();
        cache.set(GuildId(1), vec!["!".into()]).await.unwrap();

        let guild = cache.command_prefixes(Some(GuildId(1)), UserId(77)).await;
        assert_eq!(guild, vec!["<@!77> ", "<@77> ", "!"]);

        let dm = cache.command_prefixes(None, UserId(77)).await;
        assert_eq!(dm, vec!["<@!77> ", "<@77> ", ""]);
    }

    #[test]
    fn test_invocation_uses_longest_prefix() {
        let prefixes = vec!["?".to_string(), "??".to_string()];
        let invocation = Invocation::parse("??afk  gone fishing ", &prefixes).unwrap();
        assert_eq!(invocation.prefix, "??");
        assert_eq!(invocation.name, "afk");
        assert_eq!(invocation.args, "gone fishing");
        assert!(invocation.is("AFK"));
    }

    #[test]
    fn test_invocation_requires_prefix_and_name() {
        let prefixes = vec!["?".to_string()];
        assert!(Invocation::parse("afk", &prefixes).is_none());
        assert!(Invocation::parse("?", &prefixes).is_none());
        assert!(Invocation::parse("? ", &prefixes).is_none());
        assert_eq!(Invocation::parse("?ping", &prefixes).unwrap().args, "");
    }
}
