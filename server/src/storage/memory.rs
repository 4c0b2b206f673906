use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::error::StorageResult;
use super::traits::KvBackend;

/// Process-local backend over an ordered map.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn put(&self, key: &str, value: Bytes) -> StorageResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_tree(&self, prefix: &str) -> StorageResult<usize> {
        let root = prefix.trim_end_matches('/');
        let children = format!("{root}/");

        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| key != root && !key.starts_with(&children));
        Ok(before - entries.len())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<(String, Bytes)>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}
