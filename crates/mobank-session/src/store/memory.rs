/*
[INPUT]:  Key/value writes from the session core
[OUTPUT]: In-process storage with optional write-failure injection
[POS]:    Storage layer - memory backend for tests and ephemeral sessions
[UPDATE]: When the SecureStore contract changes
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{SecureStore, StoreError, StoreResult};

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write (set, multi_set, delete) fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SecureStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check_writable()?;
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn multi_get(&self, keys: &[&str]) -> StoreResult<Vec<Option<String>>> {
        let entries = self.entries.lock();
        Ok(keys.iter().map(|key| entries.get(*key).cloned()).collect())
    }

    async fn multi_set(&self, entries: &[(&str, String)]) -> StoreResult<()> {
        self.check_writable()?;
        let mut map = self.entries.lock();
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.check_writable()?;
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.set("a", "1").await.unwrap();
        store
            .multi_set(&[("b", "2".to_string()), ("c", "3".to_string())])
            .await
            .unwrap();

        let values = store.multi_get(&["a", "b", "missing"]).await.unwrap();
        assert_eq!(values, vec![Some("1".into()), Some("2".into()), None]);

        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_write_failure() {
        let store = MemoryStore::new();
        store.set("a", "1").await.unwrap();
        store.set_fail_writes(true);

        assert!(matches!(
            store.set("a", "2").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.multi_set(&[("b", "2".to_string())]).await.is_err());
        assert!(store.delete("a").await.is_err());

        // reads keep working and nothing changed
        assert_eq!(store.get("a").await.unwrap(), Some("1".into()));
        assert!(!store.contains("b"));
    }
}
