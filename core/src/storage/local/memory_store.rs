use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::storage::error::StorageError;
use crate::storage::traits::LocalStore;

/// In-process key-value store, used where no data directory is available
#[derive(Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic_operations() {
        let store = MemoryStore::new();
        store.set_item("a", "1").await.unwrap();
        store.set_item("b", "2").await.unwrap();
        assert_eq!(store.len().await, 2);

        store.remove_item("a").await.unwrap();
        assert!(store.get_item("a").await.unwrap().is_none());
        assert_eq!(store.get_item("b").await.unwrap().as_deref(), Some("2"));
    }
}
