use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[from] StorageError),

    #[error("Stored value at {key} is not valid JSON: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type RegistryResult<T> = Result<T, RegistryError>;
