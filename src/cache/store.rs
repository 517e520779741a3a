use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

use super::backend::KeyValueStore;
use super::codec::Encoding;
use super::types::{CacheEntry, StoreError};

/// Typed access to cache entries
///
/// Implementations never fail: unreadable or unavailable storage is reported
/// as an absent entry, and writes that cannot be performed are dropped.
pub trait CacheStore<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<CacheEntry<V>>;

    fn set(&self, entry: &CacheEntry<V>);

    fn remove(&self, key: &str);
}

/// Store over a durable key-value backend, keyed `<namespace>:<cacheKey>`
pub struct PersistentStore<V> {
    backend: Arc<dyn KeyValueStore>,
    namespace: String,
    encoding: Encoding,
    _value: PhantomData<fn() -> V>,
}

impl<V> PersistentStore<V> {
    pub fn new(backend: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            encoding: Encoding::default(),
            _value: PhantomData,
        }
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Backend key for a cache key
    pub fn namespaced_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

impl<V> fmt::Debug for PersistentStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentStore")
            .field("namespace", &self.namespace)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl<V> CacheStore<V> for PersistentStore<V>
where
    V: Serialize + DeserializeOwned,
{
    fn get(&self, key: &str) -> Option<CacheEntry<V>> {
        let backend_key = self.namespaced_key(key);
        let bytes = match self.backend.get(&backend_key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read for {} failed, treating as absent: {}", backend_key, e);
                return None;
            }
        };

        match self.encoding.decode::<V>(&backend_key, &bytes) {
            Ok(entry) if entry.key == key => Some(entry),
            Ok(entry) => {
                let err = StoreError::Corrupt {
                    key: backend_key,
                    reason: format!("entry belongs to key '{}'", entry.key),
                };
                warn!("Ignoring cache entry: {}", err);
                None
            }
            Err(e) => {
                warn!("Ignoring cache entry: {}", e);
                None
            }
        }
    }

    fn set(&self, entry: &CacheEntry<V>) {
        let backend_key = self.namespaced_key(&entry.key);
        let result = self
            .encoding
            .encode(entry)
            .and_then(|bytes| self.backend.set(&backend_key, &bytes));

        match result {
            Ok(()) => debug!("Stored {} ({})", backend_key, entry.fingerprint),
            Err(e) => warn!("Cache write for {} dropped: {}", backend_key, e),
        }
    }

    fn remove(&self, key: &str) {
        let backend_key = self.namespaced_key(key);
        if let Err(e) = self.backend.remove(&backend_key) {
            warn!("Cache removal for {} failed: {}", backend_key, e);
        }
    }
}

/// In-memory store scoped to the process
#[derive(Debug)]
pub struct EphemeralStore<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
}

impl<V> EphemeralStore<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<V> Default for EphemeralStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CacheStore<V> for EphemeralStore<V>
where
    V: Clone + Send + Sync,
{
    fn get(&self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, entry: &CacheEntry<V>) {
        self.entries
            .write()
            .insert(entry.key.clone(), entry.clone());
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::{MemoryBackend, MockKeyValueStore};
    use crate::cache::fingerprint::Fingerprint;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn entry(key: &str, value: &str) -> CacheEntry<String> {
        let fp = Fingerprint::compute(&[1u32][..], &|n: &u32| json!({ "id": n })).unwrap();
        CacheEntry::new(key, fp, value.to_string())
    }

    #[test]
    fn test_persistent_store_reads_back_entries() {
        for encoding in [Encoding::Json, Encoding::Compact] {
            let backend = Arc::new(MemoryBackend::new());
            let store: PersistentStore<String> =
                PersistentStore::new(backend.clone(), "klaytic").with_encoding(encoding);

            let written = entry("insight", "Focus on item 1.");
            store.set(&written);

            assert_eq!(store.get("insight"), Some(written));
            assert!(backend.get("klaytic:insight").unwrap().is_some());
        }
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let backend = Arc::new(MemoryBackend::new());
        let ours: PersistentStore<String> = PersistentStore::new(backend.clone(), "ours");
        let theirs: PersistentStore<String> = PersistentStore::new(backend, "theirs");

        ours.set(&entry("insight", "mine"));
        assert!(theirs.get("insight").is_none());
        assert_eq!(ours.namespaced_key("insight"), "ours:insight");
    }

    #[test]
    fn test_corrupt_bytes_read_as_absent() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set("klaytic:insight", b"\x00garbage{").unwrap();

        let store: PersistentStore<String> = PersistentStore::new(backend.clone(), "klaytic");
        assert!(store.get("insight").is_none());

        // The next write replaces the corrupt value
        store.set(&entry("insight", "fresh"));
        assert_eq!(store.get("insight").map(|e| e.value), Some("fresh".to_string()));
    }

    #[test]
    fn test_entry_for_another_key_reads_as_absent() {
        let backend = Arc::new(MemoryBackend::new());
        let store: PersistentStore<String> = PersistentStore::new(backend.clone(), "klaytic");
        store.set(&entry("mood-message", "hello"));

        let copied = backend.get("klaytic:mood-message").unwrap().unwrap();
        backend.set("klaytic:insight", &copied).unwrap();
        assert!(store.get("insight").is_none());
    }

    #[test]
    fn test_unavailable_backend_degrades_to_cold_cache() {
        let mut backend = MockKeyValueStore::new();
        backend
            .expect_get()
            .returning(|_| Err(StoreError::Unavailable("storage disabled".into())));
        backend
            .expect_set()
            .times(1)
            .returning(|_, _| Err(StoreError::Unavailable("quota exceeded".into())));
        backend
            .expect_remove()
            .returning(|_| Err(StoreError::Unavailable("storage disabled".into())));

        let store: PersistentStore<String> = PersistentStore::new(Arc::new(backend), "klaytic");
        assert!(store.get("insight").is_none());
        store.set(&entry("insight", "dropped"));
        store.remove("insight");
        assert!(store.get("insight").is_none());
    }

    #[test]
    fn test_ephemeral_store_operations() {
        let store: EphemeralStore<String> = EphemeralStore::new();
        assert!(store.is_empty());

        store.set(&entry("insight", "one"));
        store.set(&entry("insight", "two"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("insight").map(|e| e.value), Some("two".to_string()));

        store.remove("insight");
        assert!(store.get("insight").is_none());
    }
}
