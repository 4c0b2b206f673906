mod backend;
mod config;
mod error;
mod memory;
mod traits;


use std::sync::Arc;

pub use backend::ObjectStoreBackend;
pub use config::StorageConfig;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use traits::KvBackend;

/// Opens the backend described by `config`.
pub fn connect(config: StorageConfig) -> anyhow::Result<Arc<dyn KvBackend>> {
    let backend: Arc<dyn KvBackend> = match config {
        StorageConfig::Memory => Arc::new(MemoryBackend::new()),
        other => Arc::new(ObjectStoreBackend::from_config(other)?),
    };
    Ok(backend)
}
