use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Key/value store abstraction for disposable read models.
///
/// `list` returns values in key order; with UUIDv7 keys that is creation order.
pub trait ReadStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn upsert(&self, key: K, value: V);
    fn list(&self) -> Vec<V>;
    fn remove(&self, key: &K) -> Option<V>;
    /// Drop every record (rebuild support).
    fn clear(&self);
}

impl<K, V, S> ReadStore<K, V> for Arc<S>
where
    S: ReadStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Option<V> {
        (**self).get(key)
    }

    fn upsert(&self, key: K, value: V) {
        (**self).upsert(key, value)
    }

    fn list(&self) -> Vec<V> {
        (**self).list()
    }

    fn remove(&self, key: &K) -> Option<V> {
        (**self).remove(key)
    }

    fn clear(&self) {
        (**self).clear()
    }
}

/// In-memory ordered store.
#[derive(Debug)]
pub struct InMemoryReadStore<K, V> {
    inner: RwLock<BTreeMap<K, V>>,
}

impl<K, V> InMemoryReadStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryReadStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ReadStore<K, V> for InMemoryReadStore<K, V>
where
    K: Clone + Ord + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(key).cloned()
    }

    fn upsert(&self, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(key, value);
        }
    }

    fn list(&self) -> Vec<V> {
        match self.inner.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => vec![],
        }
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.inner.write().ok()?.remove(key)
    }

    fn clear(&self) {
        if let Ok(mut map) = self.inner.write() {
            map.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_follows_key_order() {
        let store = InMemoryReadStore::new();
        store.upsert(3, "c");
        store.upsert(1, "a");
        store.upsert(2, "b");
        assert_eq!(store.list(), vec!["a", "b", "c"]);

        store.upsert(2, "B");
        assert_eq!(store.get(&2), Some("B"));
        assert_eq!(store.remove(&1), Some("a"));
        assert_eq!(store.list().len(), 2);

        store.clear();
        assert!(store.list().is_empty());
    }

    #[test]
    fn shared_store_is_usable_through_arc() {
        let store: Arc<InMemoryReadStore<u8, String>> = Arc::new(InMemoryReadStore::new());
        let shared = Arc::clone(&store);
        shared.upsert(1, "one".to_string());
        assert_eq!(store.get(&1).as_deref(), Some("one"));
    }
}
