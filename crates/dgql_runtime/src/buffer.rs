//! Deferred load buffer.
//!
//! Resolvers that only know the identity of a related node return a
//! [`PendingReference::Pending`] instead of fetching it inline. The buffer
//! collects those references; the first read of any unresolved handle
//! flushes the whole queue, one bulk fetch per target type, so every
//! reference enqueued in the same wave is resolved together. References
//! enqueued while a wave is being resolved are drained in the same flush.

use crate::store::{row_id, EntityStore};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A resolved value or a reference to a node not yet loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingReference {
    /// The value is already available.
    Loaded(Value),
    /// Only the identity is known; the node must be bulk-fetched.
    Pending { type_name: String, id: String },
}

impl PendingReference {
    /// Wraps an available value.
    pub fn loaded(value: Value) -> Self {
        Self::Loaded(value)
    }

    /// References a node by type and identity.
    pub fn pending(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Pending {
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

type Slot = Arc<Mutex<Option<Value>>>;

/// A handle to a value resolved by the buffer.
///
/// Reading an unresolved handle triggers the flush, so the demand for one
/// value loads the entire queued wave.
#[derive(Clone)]
pub struct Deferred {
    slot: Slot,
    buffer: Arc<BufferInner>,
}

impl Deferred {
    /// The resolved value; null when the node was not found.
    pub async fn value(&self) -> Value {
        if let Some(value) = self.slot.lock().await.clone() {
            return value;
        }
        self.buffer.flush().await;
        self.slot.lock().await.clone().unwrap_or(Value::Null)
    }

    /// True once a flush has filled this handle.
    pub async fn is_resolved(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

struct Entry {
    id: String,
    slot: Slot,
}

struct BufferInner {
    store: Arc<dyn EntityStore>,
    /// Target type -> queued references, in first-insertion order.
    queue: Mutex<IndexMap<String, Vec<Entry>>>,
}

impl BufferInner {
    /// Resolves every queued reference.
    ///
    /// Each wave performs one bulk fetch per target type over the deduped
    /// identity list. A failed fetch resolves its references to null; it
    /// never fails the flush. The queue is always left empty.
    async fn flush(&self) {
        loop {
            let wave = {
                let mut queue = self.queue.lock().await;
                if queue.is_empty() {
                    break;
                }
                std::mem::take(&mut *queue)
            };

            for (type_name, entries) in wave {
                let mut ids: Vec<String> = Vec::new();
                for entry in &entries {
                    if !ids.contains(&entry.id) {
                        ids.push(entry.id.clone());
                    }
                }

                let by_id: FxHashMap<String, Value> =
                    match self.store.fetch_many(&type_name, &ids).await {
                        Ok(rows) => rows
                            .into_iter()
                            .filter_map(|row| row_id(&row).map(|id| (id, row)))
                            .collect(),
                        Err(err) => {
                            tracing::warn!(
                                type_name = %type_name,
                                error = %err,
                                "bulk fetch failed, resolving references to null"
                            );
                            FxHashMap::default()
                        }
                    };

                for entry in entries {
                    let value = by_id.get(&entry.id).cloned().unwrap_or(Value::Null);
                    *entry.slot.lock().await = Some(value);
                }
            }
        }
    }
}

/// Collects pending references and resolves them in bulk.
#[derive(Clone)]
pub struct DeferredBuffer {
    inner: Arc<BufferInner>,
}

impl DeferredBuffer {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                store,
                queue: Mutex::new(IndexMap::new()),
            }),
        }
    }

    /// Enqueues a reference and returns its handle.
    pub async fn defer(&self, type_name: &str, id: &str) -> Deferred {
        let slot: Slot = Arc::new(Mutex::new(None));
        self.inner
            .queue
            .lock()
            .await
            .entry(type_name.to_string())
            .or_default()
            .push(Entry {
                id: id.to_string(),
                slot: Arc::clone(&slot),
            });
        Deferred {
            slot,
            buffer: Arc::clone(&self.inner),
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.queue.lock().await.is_empty()
    }

    /// Resolves every queued reference now, without waiting for a read.
    pub async fn flush(&self) {
        self.inner.flush().await;
    }
}

impl std::fmt::Debug for DeferredBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredBuffer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NodeQuery};
    use async_trait::async_trait;
    use dgql_core::{DeferredFetchError, ResolutionError};
    use serde_json::json;

    #[tokio::test]
    async fn first_read_flushes_the_whole_wave() {
        let store = Arc::new(MemoryStore::new());
        for i in 1..=5u32 {
            store
                .insert("User", json!({"id": i.to_string(), "name": format!("user{i}")}))
                .await;
        }
        let buffer = DeferredBuffer::new(Arc::clone(&store) as Arc<dyn EntityStore>);

        let mut handles = Vec::new();
        for i in 1..=5u32 {
            handles.push(buffer.defer("User", &i.to_string()).await);
        }
        assert_eq!(store.bulk_fetches(), 0);

        // Reading the first handle resolves every sibling with one fetch.
        assert_eq!(handles[0].value().await["name"], json!("user1"));
        assert_eq!(store.bulk_fetches(), 1);
        for (i, handle) in handles.iter().enumerate() {
            assert!(handle.is_resolved().await);
            let value = handle.value().await;
            assert_eq!(value["name"], json!(format!("user{}", i + 1)));
        }
        assert_eq!(store.bulk_fetches(), 1);
        assert!(buffer.is_empty().await);
    }

    #[tokio::test]
    async fn duplicate_identities_are_deduped() {
        let store = Arc::new(MemoryStore::new());
        store.insert("User", json!({"id": "1"})).await;
        let buffer = DeferredBuffer::new(Arc::clone(&store) as Arc<dyn EntityStore>);

        let a = buffer.defer("User", "1").await;
        let b = buffer.defer("User", "1").await;

        assert_eq!(a.value().await, b.value().await);
        assert_eq!(store.bulk_fetches(), 1);
    }

    #[tokio::test]
    async fn missing_nodes_resolve_to_null() {
        let store = Arc::new(MemoryStore::new());
        store.insert("User", json!({"id": "1"})).await;
        let buffer = DeferredBuffer::new(store as Arc<dyn EntityStore>);

        let found = buffer.defer("User", "1").await;
        let missing = buffer.defer("User", "404").await;

        assert!(found.value().await.is_object());
        assert_eq!(missing.value().await, Value::Null);
        assert!(missing.is_resolved().await);
    }

    #[tokio::test]
    async fn explicit_flush_resolves_without_a_read() {
        let store = Arc::new(MemoryStore::new());
        store.insert("User", json!({"id": "1", "name": "Ada"})).await;
        let buffer = DeferredBuffer::new(Arc::clone(&store) as Arc<dyn EntityStore>);

        let handle = buffer.defer("User", "1").await;
        buffer.flush().await;

        assert!(handle.is_resolved().await);
        assert_eq!(handle.value().await["name"], json!("Ada"));
        assert_eq!(store.bulk_fetches(), 1);
    }

    struct FailingStore;

    #[async_trait]
    impl EntityStore for FailingStore {
        async fn fetch_many(
            &self,
            type_name: &str,
            _ids: &[String],
        ) -> Result<Vec<Value>, DeferredFetchError> {
            Err(DeferredFetchError::new(type_name, "backend unavailable"))
        }

        async fn count(&self, _query: &NodeQuery) -> Result<u64, ResolutionError> {
            Ok(0)
        }

        async fn fetch(&self, _query: &NodeQuery) -> Result<Vec<Value>, ResolutionError> {
            Ok(Vec::new())
        }

        async fn commit(&self, _type_name: &str, node: Value) -> Result<Value, ResolutionError> {
            Ok(node)
        }
    }

    #[tokio::test]
    async fn fetch_failure_degrades_to_null_and_clears_the_queue() {
        let buffer = DeferredBuffer::new(Arc::new(FailingStore));
        let a = buffer.defer("User", "1").await;
        let b = buffer.defer("Post", "2").await;

        assert_eq!(a.value().await, Value::Null);
        assert_eq!(b.value().await, Value::Null);
        assert!(buffer.is_empty().await);
    }
}
