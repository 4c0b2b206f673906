//! Versioned configuration registry over a [`KvBackend`].
//!
//! Nothing here is transactional. Version uniqueness is enforced by reading
//! the version key before writing it, so two concurrent writers of the same
//! `(id, version)` can both pass the check and the later write wins. Writes
//! spanning several keys (a group and its label-sets) are not rolled back on
//! partial failure.

mod configs;
mod error;
mod groups;
mod idempotency;
pub mod keys;


use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

use crate::storage::KvBackend;

pub use configs::ConfigStore;
pub use error::{RegistryError, RegistryResult};
pub use groups::GroupIndex;
pub use idempotency::IdempotencyLedger;

/// Every registry component, sharing one injected backend.
#[derive(Clone)]
pub struct Registry {
    pub configs: ConfigStore,
    pub groups: GroupIndex,
    pub idempotency: IdempotencyLedger,
}

impl Registry {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            configs: ConfigStore::new(Arc::clone(&backend)),
            groups: GroupIndex::new(Arc::clone(&backend)),
            idempotency: IdempotencyLedger::new(backend),
        }
    }
}

fn encode_json<T: Serialize>(key: &str, value: &T) -> RegistryResult<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|source| RegistryError::Serialization {
            key: key.to_string(),
            source,
        })
}

fn decode_json<T: DeserializeOwned>(key: &str, raw: &[u8]) -> RegistryResult<T> {
    serde_json::from_slice(raw).map_err(|source| RegistryError::Serialization {
        key: key.to_string(),
        source,
    })
}

fn require_non_empty(field: &str, value: &str) -> RegistryResult<()> {
    if value.trim().is_empty() {
        return Err(RegistryError::Malformed(format!("{field} must not be empty")));
    }
    Ok(())
}
