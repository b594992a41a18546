//! Store test doubles shared by the unit tests of this crate.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use super::{Document, MemoryStateStore, StateStore, StoreError, StoreResult};

/// Wraps a `MemoryStateStore` with write failure injection and write gates.
///
/// A gate holds every write that touches the given key (document id or field
/// name) until the gate is opened.
#[derive(Default)]
pub(crate) struct FlakyStore {
    pub(crate) inner: MemoryStateStore,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Hold writes touching `key` until `open` is called.
    pub(crate) fn gate(&self, key: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(key.to_string(), Arc::new(Semaphore::new(0)));
    }

    pub(crate) fn open(&self, key: &str) {
        if let Some(gate) = self.gates.lock().unwrap().remove(key) {
            gate.add_permits(Semaphore::MAX_PERMITS);
        }
    }

    async fn before_write(&self, id: &str, fields: &[&str]) -> StoreResult<()> {
        let gate = {
            let gates = self.gates.lock().unwrap();
            gates
                .iter()
                .find(|(key, _)| key.as_str() == id || fields.contains(&key.as_str()))
                .map(|(_, gate)| Arc::clone(gate))
        };
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("injected write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn exists(&self, collection: &str, id: &str) -> StoreResult<bool> {
        self.inner.exists(collection, id).await
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<String>> {
        self.inner.list(collection).await
    }

    async fn set(&self, collection: &str, id: &str, document: Document) -> StoreResult<()> {
        let fields: Vec<&str> = document.keys().map(String::as_str).collect();
        self.before_write(id, &fields).await?;
        self.inner.set(collection, id, document).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()> {
        let names: Vec<&str> = fields.keys().map(String::as_str).collect();
        self.before_write(id, &names).await?;
        self.inner.update(collection, id, fields).await
    }

    async fn merge(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()> {
        let names: Vec<&str> = fields.keys().map(String::as_str).collect();
        self.before_write(id, &names).await?;
        self.inner.merge(collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.before_write(id, &[]).await?;
        self.inner.delete(collection, id).await
    }

    async fn delete_field(&self, collection: &str, id: &str, field: &str) -> StoreResult<()> {
        self.before_write(id, &[field]).await?;
        self.inner.delete_field(collection, id, field).await
    }
}
