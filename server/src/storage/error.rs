use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Corrupt object at {path}: {reason}")]
    CorruptObject { path: String, reason: String },

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
