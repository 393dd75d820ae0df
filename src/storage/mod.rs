use ahash::AHashMap;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

/// Namespace the configuration blob lives under.
pub const STORAGE_NAMESPACE: &str = "storage";
/// Key of the last-applied configuration document.
pub const CONFIG_KEY: &str = "json_config";

/// Minimal namespaced blob store the core persists through. The real
/// backing (NVS, flash FS, sqlite) is supplied by the embedding.
pub trait BlobStore: Send + Sync + 'static {
    fn put(&self, namespace: &str, key: &str, value: Bytes);
    fn get(&self, namespace: &str, key: &str) -> Option<Bytes>;
    fn delete(&self, namespace: &str, key: &str);
}

/// Heap-backed store for tests and host embeddings.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<AHashMap<(String, String), Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, namespace: &str, key: &str, value: Bytes) {
        self.blobs
            .lock()
            .insert((namespace.to_string(), key.to_string()), value);
    }

    fn get(&self, namespace: &str, key: &str) -> Option<Bytes> {
        self.blobs
            .lock()
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
    }

    fn delete(&self, namespace: &str, key: &str) {
        self.blobs
            .lock()
            .remove(&(namespace.to_string(), key.to_string()));
    }
}

/// Persist the raw accepted document, deleting the previous blob first.
pub fn save_config(store: &dyn BlobStore, raw: Bytes) {
    store.delete(STORAGE_NAMESPACE, CONFIG_KEY);
    store.put(STORAGE_NAMESPACE, CONFIG_KEY, raw);
    tracing::info!("[Storage] configuration blob saved");
}

/// Load the persisted document, if any.
pub fn load_config(store: &dyn BlobStore) -> Option<Bytes> {
    let blob = store.get(STORAGE_NAMESPACE, CONFIG_KEY);
    match &blob {
        Some(b) => tracing::info!("[Storage] configuration blob loaded ({} bytes)", b.len()),
        None => tracing::warn!("[Storage] no configuration blob found"),
    }
    blob
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_replaces_previous_blob() {
        let store = MemoryBlobStore::new();
        save_config(&store, Bytes::from_static(b"first"));
        save_config(&store, Bytes::from_static(b"second"));
        assert_eq!(load_config(&store).unwrap().as_ref(), b"second");
    }

    #[test]
    fn namespaces_do_not_collide() {
        let store = MemoryBlobStore::new();
        store.put("a", "k", Bytes::from_static(b"1"));
        store.put("b", "k", Bytes::from_static(b"2"));
        assert_eq!(store.get("a", "k").unwrap().as_ref(), b"1");
        store.delete("a", "k");
        assert!(store.get("a", "k").is_none());
        assert!(store.get("b", "k").is_some());
    }
}
