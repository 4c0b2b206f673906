use anyhow::Result;
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::{Path, PathPart};
use object_store::{ObjectStore, PutPayload};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

use super::config::StorageConfig;
use super::error::{StorageError, StorageResult};
use super::traits::KvBackend;

/// Leaf object holding a key's value. Keeping values one level below the
/// key's own path lets a key have children on filesystem-like stores.
const VALUE_LEAF: &str = "@value";

/// Longest encoded path component stored as-is. Filesystems cap names at
/// 255 bytes.
const MAX_SEGMENT_BYTES: usize = 200;

/// Marks a path component that stands in for an over-long key segment.
const HASHED_SEGMENT_PREFIX: &str = "@sha256-";

/// Objects fetched concurrently while listing.
const LIST_CONCURRENCY: usize = 8;

/// Key-value backend over any `object_store` implementation.
///
/// Each object holds an envelope of `u32` key length, the logical key and the
/// value, so listing returns exact keys without reversing path encoding.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn from_config(config: StorageConfig) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = match config {
            StorageConfig::Memory => Arc::new(InMemory::new()),
            StorageConfig::Local { path } => {
                std::fs::create_dir_all(&path)?;
                Arc::new(LocalFileSystem::new_with_prefix(path)?)
            }
            StorageConfig::S3 {
                bucket,
                region,
                endpoint,
                access_key_id,
                secret_access_key,
                allow_http,
            } => {
                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(bucket)
                    .with_allow_http(allow_http);
                if let Some(region) = region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                if let Some(access_key_id) = access_key_id {
                    builder = builder.with_access_key_id(access_key_id);
                }
                if let Some(secret_access_key) = secret_access_key {
                    builder = builder.with_secret_access_key(secret_access_key);
                }
                Arc::new(builder.build()?)
            }
        };
        Ok(Self { store })
    }

    /// Path component for one key segment. Over-long segments are replaced
    /// by a digest; the envelope still carries the exact key.
    fn segment_part(segment: &str) -> PathPart<'_> {
        let part = PathPart::from(segment);
        if part.as_ref().len() <= MAX_SEGMENT_BYTES {
            return part;
        }

        let digest = Sha256::digest(segment.as_bytes());
        PathPart::from(format!("{HASHED_SEGMENT_PREFIX}{}", hex::encode(digest)))
    }

    fn dir_path(key: &str) -> Path {
        key.split('/')
            .filter(|segment| !segment.is_empty())
            .map(Self::segment_part)
            .collect()
    }

    fn object_path(key: &str) -> StorageResult<Path> {
        if key.is_empty() || key.split('/').any(str::is_empty) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(Self::dir_path(key).child(VALUE_LEAF))
    }

    fn is_value_object(location: &Path) -> bool {
        let leaf = PathPart::from(VALUE_LEAF);
        location.filename() == Some(leaf.as_ref())
    }

    fn encode_envelope(key: &str, value: &[u8]) -> StorageResult<Bytes> {
        let key_len = u32::try_from(key.len())
            .map_err(|_| StorageError::InvalidKey(format!("key too long: {} bytes", key.len())))?;

        let mut buf = BytesMut::with_capacity(4 + key.len() + value.len());
        buf.put_u32(key_len);
        buf.put_slice(key.as_bytes());
        buf.put_slice(value);
        Ok(buf.freeze())
    }

    fn decode_envelope(location: &Path, mut raw: Bytes) -> StorageResult<(String, Bytes)> {
        let corrupt = |reason: &str| StorageError::CorruptObject {
            path: location.to_string(),
            reason: reason.to_string(),
        };

        if raw.remaining() < 4 {
            return Err(corrupt("missing key length"));
        }
        let key_len = raw.get_u32() as usize;
        if raw.remaining() < key_len {
            return Err(corrupt("truncated key"));
        }
        let key_bytes = raw.split_to(key_len);
        let key = String::from_utf8(key_bytes.to_vec()).map_err(|_| corrupt("key is not UTF-8"))?;
        Ok((key, raw))
    }

    /// Reads one envelope, or `None` if the object vanished mid-listing.
    async fn read_entry(&self, location: Path) -> StorageResult<Option<(String, Bytes)>> {
        match self.store.get(&location).await {
            Ok(result) => {
                let raw = result.bytes().await?;
                Self::decode_envelope(&location, raw).map(Some)
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All value objects at or beneath `dir`.
    async fn value_objects(&self, dir: &Path) -> StorageResult<Vec<Path>> {
        let mut stream = self.store.list(Some(dir));
        let mut locations = Vec::new();

        while let Some(item) = stream.next().await {
            match item {
                Ok(meta) if Self::is_value_object(&meta.location) => locations.push(meta.location),
                Ok(_) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(locations)
    }
}

#[async_trait]
impl KvBackend for ObjectStoreBackend {
    async fn put(&self, key: &str, value: Bytes) -> StorageResult<()> {
        let path = Self::object_path(key)?;
        let envelope = Self::encode_envelope(key, &value)?;
        self.store.put(&path, PutPayload::from(envelope)).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let path = Self::object_path(key)?;
        Ok(self.read_entry(path).await?.map(|(_, value)| value))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = Self::object_path(key)?;
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_tree(&self, prefix: &str) -> StorageResult<usize> {
        let root = Self::dir_path(prefix);
        if root.as_ref().is_empty() {
            return Err(StorageError::InvalidKey(prefix.to_string()));
        }

        let locations = self.value_objects(&root).await?;
        let mut deleted = 0;
        for location in locations {
            match self.store.delete(&location).await {
                Ok(()) => deleted += 1,
                Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        debug!(prefix, deleted, "deleted key tree");
        Ok(deleted)
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<(String, Bytes)>> {
        // Object stores list by whole segments, so scan the enclosing
        // directory and filter on the raw prefix.
        let dir = prefix.rfind('/').map_or("", |i| &prefix[..i]);
        let locations = self.value_objects(&Self::dir_path(dir)).await?;

        let mut entries: Vec<(String, Bytes)> = futures::stream::iter(locations)
            .map(|location| self.read_entry(location))
            .buffered(LIST_CONCURRENCY)
            .try_filter_map(|entry| async move {
                Ok::<_, StorageError>(entry.filter(|(key, _)| key.starts_with(prefix)))
            })
            .try_collect()
            .await?;

        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}
