//! In-memory document store.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{Document, StateStore, StoreError, StoreResult};

/// Process-local `StateStore` backed by nested maps.
///
/// Collections are created on first write. Document ids are kept ordered so
/// `list` is deterministic.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `(collection, id, document)` triples.
    pub fn with_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = (String, String, Document)>,
    {
        let mut collections: HashMap<String, BTreeMap<String, Document>> = HashMap::new();
        for (collection, id, document) in documents {
            collections.entry(collection).or_default().insert(id, document);
        }
        Self {
            collections: RwLock::new(collections),
        }
    }

    /// Number of documents across all collections
    pub async fn document_count(&self) -> usize {
        let collections = self.collections.read().await;
        collections.values().map(BTreeMap::len).sum()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn exists(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .is_some_and(|docs| docs.contains_key(id)))
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<String>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn set(&self, collection: &str, id: &str, document: Document) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        let document = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        document.extend(fields);
        Ok(())
    }

    async fn merge(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default()
            .extend(fields);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn delete_field(&self, collection: &str, id: &str, field: &str) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        if let Some(document) = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
        {
            document.remove(field);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_set_get_exists() {
        let store = MemoryStateStore::new();
        assert!(!store.exists("guilds", "1").await.unwrap());

        store
            .set("guilds", "1", doc(json!({"prefixes": ["!"]})))
            .await
            .unwrap();

        assert!(store.exists("guilds", "1").await.unwrap());
        let fetched = store.get("guilds", "1").await.unwrap().unwrap();
        assert_eq!(fetched["prefixes"], json!(["!"]));
    }

    #[tokio::test]
    async fn test_update_requires_existing_document() {
        let store = MemoryStateStore::new();
        let err = store
            .update("guilds", "1", doc(json!({"prefixes": []})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryStateStore::new();
        store.set("users", "afks", doc(json!({"1": "a"}))).await.unwrap();
        store.update("users", "afks", doc(json!({"2": "b"}))).await.unwrap();

        let fetched = store.get("users", "afks").await.unwrap().unwrap();
        assert_eq!(fetched.len(), 2);
    }

    #[tokio::test]
    async fn test_merge_creates_then_merges() {
        let store = MemoryStateStore::new();
        store.merge("users", "afks", doc(json!({"1": "a"}))).await.unwrap();
        store.merge("users", "afks", doc(json!({"2": "b"}))).await.unwrap();
        store.merge("users", "afks", doc(json!({"1": "c"}))).await.unwrap();

        let fetched = store.get("users", "afks").await.unwrap().unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched["1"], "c");
        assert_eq!(fetched["2"], "b");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStateStore::new();
        store.delete("guilds", "missing").await.unwrap();
        store.delete_field("guilds", "missing", "prefixes").await.unwrap();

        store.set("guilds", "1", doc(json!({"prefixes": ["!"], "x": 1}))).await.unwrap();
        store.delete_field("guilds", "1", "prefixes").await.unwrap();
        let fetched = store.get("guilds", "1").await.unwrap().unwrap();
        assert!(!fetched.contains_key("prefixes"));

        store.delete("guilds", "1").await.unwrap();
        assert!(store.get("guilds", "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_ordered() {
        let store = MemoryStateStore::with_documents(vec![
            ("guilds".to_string(), "b".to_string(), Document::new()),
            ("guilds".to_string(), "a".to_string(), Document::new()),
            ("users".to_string(), "afks".to_string(), Document::new()),
        ]);
        assert_eq!(store.list("guilds").await.unwrap(), vec!["a", "b"]);
        assert!(store.list("missing").await.unwrap().is_empty());
        assert_eq!(store.document_count().await, 3);
    }
}
