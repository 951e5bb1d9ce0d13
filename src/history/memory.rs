use async_trait::async_trait;
use crate::history::{ HistoryStore, StoreError };
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local backend for `HISTORY_TYPE=memory` and tests.
#[derive(Default)]
pub struct MemoryHistoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
