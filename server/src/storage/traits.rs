use async_trait::async_trait;
use bytes::Bytes;

use super::error::StorageResult;

/// Hierarchical, prefix-scannable key-value store.
///
/// Keys are `/`-delimited strings. Each call is atomic for the single key it
/// touches; nothing spans more than one key.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn put(&self, key: &str, value: Bytes) -> StorageResult<()>;

    /// Returns `None` when the key is absent.
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Deletes `prefix` itself and every key beneath `prefix/`.
    ///
    /// Matching is segment-aligned: removing `group/a/v1` leaves
    /// `group/a/v10` untouched. Returns the number of keys removed.
    async fn delete_tree(&self, prefix: &str) -> StorageResult<usize>;

    /// Every key starting with the raw string `prefix`, in key order.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<(String, Bytes)>>;
}
