//! Away records, one per user.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use super::{CacheScope, ScopedCache};
use crate::store::{StateStore, StoreResult, upsert_field};
use crate::types::UserId;

const COLLECTION: &str = "users";
const DOCUMENT: &str = "afks";

/// Why and since when a user is away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwayRecord {
    pub reason: String,
    #[serde(rename = "time")]
    pub since: DateTime<Utc>,
}

impl AwayRecord {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            since: Utc::now(),
        }
    }
}

/// `users/afks.<user_id>`
pub struct AwayScope;

pub type AwayCache = ScopedCache<AwayScope>;

#[async_trait]
impl CacheScope for AwayScope {
    type Key = UserId;
    type Value = AwayRecord;

    fn name(&self) -> &'static str {
        "away"
    }

    async fn load(&self, store: &dyn StateStore) -> StoreResult<HashMap<UserId, AwayRecord>> {
        let mut records = HashMap::new();
        let Some(doc) = store.get(COLLECTION, DOCUMENT).await? else {
            return Ok(records);
        };
        for (id, value) in doc {
            let Ok(user) = id.parse::<UserId>() else {
                warn!(id = %id, "Skipping away record with non-numeric id");
                continue;
            };
            match serde_json::from_value::<AwayRecord>(value) {
                Ok(record) => {
                    records.insert(user, record);
                }
                Err(e) => warn!(user = %user, error = %e, "Skipping malformed away record"),
            }
        }
        Ok(records)
    }

    async fn persist(
        &self,
        store: &dyn StateStore,
        key: &UserId,
        value: &AwayRecord,
    ) -> StoreResult<()> {
        let record = serde_json::to_value(value)?;
        upsert_field(store, COLLECTION, DOCUMENT, &key.to_string(), record).await
    }

    async fn erase(&self, store: &dyn StateStore, key: &UserId) -> StoreResult<()> {
        store.delete_field(COLLECTION, DOCUMENT, &key.to_string()).await
    }
}
