//! SQLite-backed document store.
//!
//! Every document is one row of the `document` table, its body stored as
//! JSON text. Field-level operations read, merge and write the body inside a
//! transaction.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::{Document, StateStore, StoreError, StoreResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS document (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    body TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (collection, id)
);
";

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All operations acquire the lock and never
/// hold it across an await point.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open (or create) the database at a specific path
    pub fn open_path(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::unavailable(e.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn read_body(
        conn: &Connection,
        collection: &str,
        id: &str,
    ) -> StoreResult<Option<Document>> {
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM document WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => {
                let value: serde_json::Value = serde_json::from_str(&body)?;
                match value {
                    serde_json::Value::Object(document) => Ok(Some(document)),
                    _ => Err(StoreError::malformed(collection, id, "body is not an object")),
                }
            }
            None => Ok(None),
        }
    }

    fn write_body(
        conn: &Connection,
        collection: &str,
        id: &str,
        document: &Document,
    ) -> StoreResult<()> {
        let body = serde_json::to_string(document)?;
        let now = chrono::Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO document (collection, id, body, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body,
                                                       updated_at = excluded.updated_at",
            params![collection, id, body, now],
        )?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        Self::read_body(&conn, collection, id)
    }

    async fn exists(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM document WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut stmt =
            conn.prepare("SELECT id FROM document WHERE collection = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![collection], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    async fn set(&self, collection: &str, id: &str, document: Document) -> StoreResult<()> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        Self::write_body(&conn, collection, id, &document)
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let tx = conn.transaction()?;
        let mut document = Self::read_body(&tx, collection, id)?
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        document.extend(fields);
        Self::write_body(&tx, collection, id, &document)?;
        tx.commit()?;
        Ok(())
    }

    async fn merge(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let tx = conn.transaction()?;
        let mut document = Self::read_body(&tx, collection, id)?.unwrap_or_default();
        document.extend(fields);
        Self::write_body(&tx, collection, id, &document)?;
        tx.commit()?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute(
            "DELETE FROM document WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(())
    }

    async fn delete_field(&self, collection: &str, id: &str, field: &str) -> StoreResult<()> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let tx = conn.transaction()?;
        if let Some(mut document) = Self::read_body(&tx, collection, id)? {
            if document.remove(field).is_some() {
                Self::write_body(&tx, collection, id, &document)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute_batch("SELECT 1")?;
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
    async fn test_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("oneki.db");

        {
            let store = SqliteStateStore::open_path(&path).unwrap();
            store
                .set("guilds", "1", doc(json!({"prefixes": ["!", "$"]})))
                .await
                .unwrap();
        }

        let store = SqliteStateStore::open_path(&path).unwrap();
        let fetched = store.get("guilds", "1").await.unwrap().unwrap();
        assert_eq!(fetched["prefixes"], json!(["!", "$"]));
        assert!(store.exists("guilds", "1").await.unwrap());
        assert!(!store.exists("guilds", "2").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_and_delete_field() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let err = store
            .update("users", "afks", doc(json!({"1": {}})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        store.set("users", "afks", doc(json!({"1": "a"}))).await.unwrap();
        store.update("users", "afks", doc(json!({"2": "b"}))).await.unwrap();
        store.delete_field("users", "afks", "1").await.unwrap();

        let fetched = store.get("users", "afks").await.unwrap().unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched["2"], "b");
    }

    #[tokio::test]
    async fn test_concurrent_merges_keep_every_field() {
        let store = std::sync::Arc::new(SqliteStateStore::open_in_memory().unwrap());
        let writes = (0..16).map(|n| {
            let store = store.clone();
            tokio::spawn(async move {
                let mut fields = Document::new();
                fields.insert(n.to_string(), json!(n));
                store.merge("blacklist", "users", fields).await
            })
        });
        for write in futures::future::join_all(writes).await {
            write.unwrap().unwrap();
        }

        let fetched = store.get("blacklist", "users").await.unwrap().unwrap();
        assert_eq!(fetched.len(), 16);
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store.set("guilds", "b", Document::new()).await.unwrap();
        store.set("guilds", "a", Document::new()).await.unwrap();
        assert_eq!(store.list("guilds").await.unwrap(), vec!["a", "b"]);

        store.delete("guilds", "a").await.unwrap();
        store.delete("guilds", "a").await.unwrap();
        assert_eq!(store.list("guilds").await.unwrap(), vec!["b"]);
        store.ping().await.unwrap();
    }
}
