use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use crate::{
    models::store::Store,
    storage::{Batch, KeyValueStore, StorageError},
};

/// In-process store. A batch is applied under one lock, so it is atomic with
/// respect to every other caller sharing the handle.
#[derive(Debug, Default)]
pub struct MemoryStore {
    store: Mutex<Store>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_store(store: Store) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Result<Store, StorageError> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store>, StorageError> {
        self.store
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn list_set(&self, set: &str) -> Result<Vec<String>, StorageError> {
        Ok(self.lock()?.members(set))
    }

    fn apply(&self, batch: Batch) -> Result<(), StorageError> {
        self.lock()?.apply(batch)
    }
}

/// A [`MemoryStore`] that lets another writer slip in: once armed, the next
/// `apply` first rewrites the armed record's `title` and only then applies
/// the batch.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct InterleavedStore {
    pub inner: MemoryStore,
    armed: Mutex<Option<String>>,
}

#[cfg(test)]
impl InterleavedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self, key: &str) {
        *self.armed.lock().unwrap() = Some(key.to_string());
    }
}

#[cfg(test)]
impl KeyValueStore for InterleavedStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.inner.get(key)
    }

    fn list_set(&self, set: &str) -> Result<Vec<String>, StorageError> {
        self.inner.list_set(set)
    }

    fn apply(&self, batch: Batch) -> Result<(), StorageError> {
        let armed = self.armed.lock().unwrap().take();
        if let Some(key) = armed
            && let Some(mut record) = self.inner.get(&key)?
        {
            record["title"] = Value::from("edited elsewhere");
            self.inner.set(&key, record)?;
        }
        self.inner.apply(batch)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_get_set_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("category:1").unwrap(), None);

        store.set("category:1", json!({"name": "Work"})).unwrap();
        assert_eq!(
            store.get("category:1").unwrap(),
            Some(json!({"name": "Work"}))
        );

        store.delete("category:1").unwrap();
        store.delete("category:1").unwrap();
        assert_eq!(store.get("category:1").unwrap(), None);
    }

    #[test]
    fn test_set_membership() {
        let store = MemoryStore::new();
        store.add_to_set("categories", "b").unwrap();
        store.add_to_set("categories", "a").unwrap();
        store.add_to_set("categories", "a").unwrap();
        assert_eq!(store.list_set("categories").unwrap(), vec!["a", "b"]);

        store.remove_from_set("categories", "a").unwrap();
        assert_eq!(store.list_set("categories").unwrap(), vec!["b"]);
        assert!(store.list_set("tasks").unwrap().is_empty());
    }
}
