//! The document store contract.
//!
//! `StateStore` is the system of record behind every scoped cache. Documents
//! live in named collections and are JSON objects; callers can replace a whole
//! document (`set`), merge fields into an existing one (`update`) or into a
//! document that may not exist yet (`merge`), remove a single field
//! (`delete_field`) or the whole document (`delete`). Existence is queryable
//! independently of content retrieval.
//!
//! Field-level writes are atomic per document: concurrent writes to different
//! fields of the same document never overwrite each other.
//!
//! Two implementations ship with the crate:
//! - [`MemoryStateStore`]: process-local, used by tests and the console bot
//! - `SqliteStateStore` (feature `db`): a single-file SQLite document table

mod memory;
#[cfg(feature = "db")]
mod sqlite;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStateStore;
#[cfg(feature = "db")]
pub use sqlite::SqliteStateStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// A stored document: a JSON object keyed by field name.
pub type Document = serde_json::Map<String, Value>;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by a `StateStore` implementation
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("malformed document {collection}/{id}: {message}")]
    Malformed {
        collection: String,
        id: String,
        message: String,
    },

    #[cfg(feature = "db")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn malformed(
        collection: impl Into<String>,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Malformed {
            collection: collection.into(),
            id: id.into(),
            message: message.into(),
        }
    }
}

/// Document-oriented key/value store organised into named collections.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch a document, `None` if it does not exist.
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Whether a document exists, without retrieving it.
    async fn exists(&self, collection: &str, id: &str) -> StoreResult<bool>;

    /// Identifiers of every document currently in a collection.
    async fn list(&self, collection: &str) -> StoreResult<Vec<String>>;

    /// Replace (or create) a whole document.
    async fn set(&self, collection: &str, id: &str, document: Document) -> StoreResult<()>;

    /// Merge fields into an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] when the document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()>;

    /// Merge fields into a document, creating it when absent.
    ///
    /// The read-modify-write happens as one step, so fields written
    /// concurrently by other callers are kept.
    async fn merge(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()>;

    /// Delete a whole document. Deleting a missing document succeeds.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    /// Delete one field of a document. Missing documents or fields succeed.
    async fn delete_field(&self, collection: &str, id: &str, field: &str) -> StoreResult<()>;

    /// Check store connectivity
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Merge a single field into a document, creating the document when absent.
///
/// An existing document keeps its other fields.
pub async fn upsert_field(
    store: &dyn StateStore,
    collection: &str,
    id: &str,
    field: &str,
    value: Value,
) -> StoreResult<()> {
    let mut fields = Document::new();
    fields.insert(field.to_string(), value);
    store.merge(collection, id, fields).await
}
