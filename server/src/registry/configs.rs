use shared_types::Config;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::error::{RegistryError, RegistryResult};
use super::{decode_json, encode_json, keys, require_non_empty};
use crate::storage::KvBackend;

/// Append-only store of configuration entries.
#[derive(Clone)]
pub struct ConfigStore {
    backend: Arc<dyn KvBackend>,
}

impl ConfigStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    fn validate(config: &Config) -> RegistryResult<()> {
        require_non_empty("version", &config.version)?;
        if config.entries.is_empty() {
            return Err(RegistryError::Malformed(
                "entries must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Stores the first version of a new config under a fresh id.
    #[instrument(skip(self, config), fields(version = %config.version))]
    pub async fn create(&self, mut config: Config) -> RegistryResult<Config> {
        Self::validate(&config)?;

        config.id = keys::new_id();
        let key = keys::config_key(&config.id, &config.version);
        self.backend.put(&key, encode_json(&key, &config)?).await?;

        info!(id = %config.id, "created config");
        Ok(config)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str, version: &str) -> RegistryResult<Config> {
        let key = keys::config_key(id, version);
        match self.backend.get(&key).await? {
            Some(raw) => decode_json(&key, &raw),
            None => Err(RegistryError::NotFound(format!("config {id}@{version}"))),
        }
    }

    /// Every stored version of `id`, in backend key order.
    ///
    /// Key order is not version order: `v10` sorts before `v2`.
    #[instrument(skip(self))]
    pub async fn list_versions(&self, id: &str) -> RegistryResult<Vec<Config>> {
        let entries = self.backend.list(&keys::config_prefix(id)).await?;
        debug!(count = entries.len(), "listed config versions");

        entries
            .iter()
            .map(|(key, raw)| decode_json(key, raw))
            .collect()
    }

    /// Stores another version of an existing config.
    ///
    /// Fails with `AlreadyExists` if `(id, version)` is already stored; the
    /// stored version is left untouched.
    #[instrument(skip(self, config), fields(id = %config.id, version = %config.version))]
    pub async fn put_new_version(&self, config: Config) -> RegistryResult<Config> {
        require_non_empty("id", &config.id)?;
        Self::validate(&config)?;

        match self.get(&config.id, &config.version).await {
            Ok(_) => {
                return Err(RegistryError::AlreadyExists(format!(
                    "config {}@{}",
                    config.id, config.version
                )));
            }
            Err(RegistryError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let key = keys::config_key(&config.id, &config.version);
        self.backend.put(&key, encode_json(&key, &config)?).await?;

        info!("stored new config version");
        Ok(config)
    }

    /// Removes a single version. Other versions of the same id remain.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str, version: &str) -> RegistryResult<()> {
        let key = keys::config_key(id, version);
        if self.backend.get(&key).await?.is_none() {
            return Err(RegistryError::NotFound(format!("config {id}@{version}")));
        }

        self.backend.delete(&key).await?;
        info!("deleted config version");
        Ok(())
    }
}
